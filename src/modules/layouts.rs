use derive_more::with_trait::Display;
use serde::{Deserialize, Serialize};

pub const LAYOUT_ALGORITHMS: [&str; 10] = [
    "spring",
    "kamada_kawai",
    "cartoGRAPH_local_tsne",
    "cartoGRAPH_local_umap",
    "cartoGRAPH_global_tsne",
    "cartoGRAPH_global_umap",
    "cartoGRAPH_importance_tsne",
    "cartoGRAPH_importance_umap",
    "cartoGRAPH_functional_tsne",
    "cartoGRAPH_functional_umap",
];

/// Anything that can contribute one layout descriptor to an upload.
pub trait LayoutSource {
    fn layout_data(&self) -> Vec<(String, String)>;
    fn update_name(&mut self, display_index: usize);
}

fn default_algo() -> String { "spring".to_string() }
fn default_iterations() -> u32 { 50 }
fn default_prplxty() -> f64 { 0.5 }
fn default_density() -> f64 { 12.0 }
fn default_l_rate() -> f64 { 200.0 }
fn default_steps() -> u32 { 250 }
fn default_n_neighbors() -> u32 { 10 }
fn default_spread() -> f64 { 1.0 }
fn default_min_dist() -> f64 { 0.1 }

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Display)]
#[display("{name} ({algo})")]
pub struct LayoutConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_algo")]
    pub algo: String,
    #[serde(default)]
    pub opt_dis: f64,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_prplxty")]
    pub prplxty: f64,
    #[serde(default = "default_density")]
    pub density: f64,
    #[serde(default = "default_l_rate")]
    pub l_rate: f64,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: u32,
    #[serde(default = "default_spread")]
    pub spread: f64,
    #[serde(default = "default_min_dist")]
    pub min_dist: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::new("", default_algo())
    }
}

impl LayoutConfig {
    pub fn new(name: impl Into<String>, algo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algo: algo.into(),
            opt_dis: 0.0,
            iterations: default_iterations(),
            prplxty: default_prplxty(),
            density: default_density(),
            l_rate: default_l_rate(),
            steps: default_steps(),
            n_neighbors: default_n_neighbors(),
            spread: default_spread(),
            min_dist: default_min_dist(),
        }
    }

    pub fn is_known_algorithm(&self) -> bool {
        LAYOUT_ALGORITHMS.contains(&self.algo.as_str())
    }

    /// Field order matches the selector's inputs.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let name = if self.name.is_empty() { &self.algo } else { &self.name };
        vec![
            ("name".to_string(), name.clone()),
            ("algo".to_string(), self.algo.clone()),
            ("opt_dis".to_string(), self.opt_dis.to_string()),
            ("iterations".to_string(), self.iterations.to_string()),
            ("prplxty".to_string(), self.prplxty.to_string()),
            ("density".to_string(), self.density.to_string()),
            ("l_rate".to_string(), self.l_rate.to_string()),
            ("steps".to_string(), self.steps.to_string()),
            ("n_neighbors".to_string(), self.n_neighbors.to_string()),
            ("spread".to_string(), self.spread.to_string()),
            ("min_dist".to_string(), self.min_dist.to_string()),
        ]
    }
}

/// A single selector widget. `id` is its creation id and never changes;
/// `label` follows its position in the list.
#[derive(Debug, Clone, PartialEq, Display)]
#[display("{label} [#{id}]")]
pub struct LayoutSelector {
    id: u32,
    label: String,
    config: Option<LayoutConfig>,
}

impl LayoutSelector {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> Option<&LayoutConfig> {
        self.config.as_ref()
    }

    pub fn set_config(&mut self, config: Option<LayoutConfig>) {
        self.config = config;
    }
}

impl LayoutSource for LayoutSelector {
    fn layout_data(&self) -> Vec<(String, String)> {
        self.config.as_ref().map(LayoutConfig::to_fields).unwrap_or_default()
    }

    fn update_name(&mut self, display_index: usize) {
        self.label = format!("Layout {display_index}");
    }
}

/// Ordered container of selectors; its order is the submission order.
#[derive(Debug, Clone, Default)]
pub struct LayoutSelectorList {
    selectors: Vec<LayoutSelector>,
    next_id: u32,
}

impl LayoutSelectorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, config: Option<LayoutConfig>) -> u32 {
        let position = self.selectors.len();
        self.insert(position, config)
    }

    /// Positions past the end append.
    pub fn insert(&mut self, position: usize, config: Option<LayoutConfig>) -> u32 {
        self.next_id += 1;
        let selector = LayoutSelector {
            id: self.next_id,
            label: String::new(),
            config,
        };
        let position = position.min(self.selectors.len());
        self.selectors.insert(position, selector);
        self.update_all_layout_selectors();
        self.selectors[position].id
    }

    pub fn remove(&mut self, id: u32) -> Option<LayoutSelector> {
        let position = self.position(id)?;
        let removed = self.selectors.remove(position);
        self.update_all_layout_selectors();
        Some(removed)
    }

    pub fn move_to(&mut self, id: u32, position: usize) -> bool {
        let Some(current) = self.position(id) else {
            return false;
        };
        let selector = self.selectors.remove(current);
        let position = position.min(self.selectors.len());
        self.selectors.insert(position, selector);
        self.update_all_layout_selectors();
        true
    }

    pub fn get(&self, id: u32) -> Option<&LayoutSelector> {
        self.selectors.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut LayoutSelector> {
        self.selectors.iter_mut().find(|s| s.id == id)
    }

    pub fn position(&self, id: u32) -> Option<usize> {
        self.selectors.iter().position(|s| s.id == id)
    }

    pub fn selectors(&self) -> &[LayoutSelector] {
        &self.selectors
    }

    pub fn labels(&self) -> Vec<&str> {
        self.selectors.iter().map(LayoutSelector::label).collect()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn update_all_layout_selectors(&mut self) {
        for (index, selector) in self.selectors.iter_mut().enumerate() {
            selector.update_name(index + 1);
        }
    }
}

impl FromIterator<LayoutConfig> for LayoutSelectorList {
    fn from_iter<I: IntoIterator<Item = LayoutConfig>>(iter: I) -> Self {
        let mut list = Self::new();
        for config in iter {
            list.push(Some(config));
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_position_not_creation_id() {
        let mut list = LayoutSelectorList::new();
        let a = list.push(Some(LayoutConfig::new("a", "spring")));
        let b = list.push(Some(LayoutConfig::new("b", "spring")));
        let c = list.insert(0, None);
        assert_eq!(list.labels(), vec!["Layout 1", "Layout 2", "Layout 3"]);
        assert_eq!(list.position(c), Some(0));
        assert_eq!(list.get(a).unwrap().label(), "Layout 2");
        assert_eq!(list.get(b).unwrap().label(), "Layout 3");
        assert_eq!(c, 3);
    }

    #[test]
    fn removal_renumbers_and_never_reuses_ids() {
        let mut list = LayoutSelectorList::new();
        let a = list.push(None);
        let b = list.push(None);
        assert!(list.remove(a).is_some());
        assert_eq!(list.get(b).unwrap().label(), "Layout 1");
        let c = list.push(None);
        assert_ne!(c, a);
        assert_eq!(list.labels(), vec!["Layout 1", "Layout 2"]);
        assert!(list.remove(a).is_none());
    }

    #[test]
    fn move_to_reorders_and_relabels() {
        let mut list: LayoutSelectorList = ["x", "y", "z"]
            .into_iter()
            .map(|n| LayoutConfig::new(n, "spring"))
            .collect();
        let z = list.selectors()[2].id();
        assert!(list.move_to(z, 0));
        assert_eq!(list.get(z).unwrap().label(), "Layout 1");
        let names: Vec<_> = list
            .selectors()
            .iter()
            .map(|s| s.config().unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["z", "x", "y"]);
        assert!(!list.move_to(99, 0));
    }

    #[test]
    fn blank_selector_has_no_fields() {
        let mut list = LayoutSelectorList::new();
        let id = list.push(None);
        assert!(list.get(id).unwrap().layout_data().is_empty());
    }

    #[test]
    fn config_fields_use_server_defaults() {
        let fields = LayoutConfig::new("", "kamada_kawai").to_fields();
        let lookup = |key: &str| fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(lookup("name"), Some("kamada_kawai"));
        assert_eq!(lookup("iterations"), Some("50"));
        assert_eq!(lookup("prplxty"), Some("0.5"));
        assert_eq!(lookup("density"), Some("12"));
        assert_eq!(lookup("min_dist"), Some("0.1"));
        assert_eq!(fields.len(), 11);
    }

    #[test]
    fn config_parses_with_partial_fields() {
        let config: LayoutConfig = toml::from_str("algo = \"cartoGRAPH_local_umap\"\nsteps = 10").unwrap();
        assert_eq!(config.steps, 10);
        assert_eq!(config.n_neighbors, 10);
        assert!(config.is_known_algorithm());
        assert!(!LayoutConfig::new("", "grid").is_known_algorithm());
    }
}
