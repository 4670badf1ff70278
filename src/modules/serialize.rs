use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::modules::layouts::{LayoutConfig, LayoutSelectorList};
use crate::modules::types::{Form, PROJECT_NAME_FIELD};

/// Field name of the network file part.
pub const VRNETZ_FIELD: &str = "cyEx_vrnetz";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FileEntry {
    #[serde(default = "default_file_field")]
    pub name: String,
    pub path: String,
}

fn default_file_field() -> String {
    VRNETZ_FIELD.to_string()
}

/// Everything one CLI run submits.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UploadFile {
    pub host: String,
    pub project_name: String,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub layouts: Vec<LayoutConfig>,
}

impl UploadFile {
    /// Reads file parts relative to `base_dir`. With a job set, the network
    /// comes from the job and file parts are skipped.
    pub fn to_form(&self, base_dir: &Path) -> Result<Form, Box<dyn std::error::Error>> {
        let mut form = Form::new().text(PROJECT_NAME_FIELD, self.project_name.clone());
        for field in &self.fields {
            form = form.text(field.name.clone(), field.value.clone());
        }
        if self.job.as_deref().is_some_and(|j| !j.is_empty()) {
            return Ok(form);
        }
        for file in &self.files {
            let path = base_dir.join(&file.path);
            let bytes = fs::read(&path)?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.clone());
            form = form.file(file.name.clone(), file_name, bytes);
        }
        Ok(form)
    }

    pub fn layout_list(&self) -> LayoutSelectorList {
        self.layouts.iter().cloned().collect()
    }
}

pub fn load_upload_file(path: &str) -> Result<UploadFile, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    let file: UploadFile = toml::from_str(&text)?;
    Ok(file)
}

pub fn save_upload_file(path: &str, upload: &UploadFile) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(upload)?;
    fs::write(path, toml_str)?;
    Ok(())
}
