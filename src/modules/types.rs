use derive_more::with_trait::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHECK_EVENT: &str = "checkProjExistence";
pub const PROJECT_EVENT: &str = "project";
pub const STATUS_EVENT: &str = "status";
pub const CHECK_API: &str = "check_project_exists";

/// Form field holding the project name the existence check is about.
pub const PROJECT_NAME_FIELD: &str = "CyEx_project_name";

#[derive(Debug, Clone, PartialEq, Display)]
pub enum FormValue {
    #[display("{_0}")]
    Text(String),
    #[display("<{file_name}: {} bytes>", bytes.len())]
    File { file_name: String, bytes: Vec<u8> },
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File { .. } => None,
        }
    }
}

/// Native fields of the upload form, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    pub(crate) entries: Vec<(String, FormValue)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), FormValue::Text(value.into())));
        self
    }

    pub fn file(mut self, name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.entries.push((
            name.into(),
            FormValue::File {
                file_name: file_name.into(),
                bytes,
            },
        ));
        self
    }

    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, v)| v)
    }
}

/// Ordered multipart payload. Keys may repeat, as in a browser `FormData`.
#[derive(Debug, Clone, Default, PartialEq, Display)]
#[display("payload with {} fields", entries.len())]
pub struct UploadPayload {
    pub(crate) entries: Vec<(String, FormValue)>,
}

impl UploadPayload {
    pub fn append(&mut self, name: impl Into<String>, value: FormValue) {
        self.entries.push((name.into(), value));
    }

    pub fn append_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.append(name, FormValue::Text(value.into()));
    }

    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, v)| v)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FormValue::as_text)
    }

    pub fn count(&self, name: &str) -> usize {
        self.keys().filter(|key| *key == name).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One named event on the persistent channel.
#[derive(Debug, Clone, PartialEq, Display)]
#[display("{event}: {data}")]
pub struct ChannelFrame {
    pub event: String,
    pub data: Value,
}

impl ChannelFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExistenceRequest {
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub uid: String,
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
struct ProjectReply {
    api: Option<String>,
    exists: Option<bool>,
    seq: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, PartialEq, Display)]
pub enum ServerMessage {
    #[display("status: {message}")]
    Status { message: String },
    #[display("exists={exists}")]
    ExistenceResult { exists: bool, seq: Option<u64> },
    #[display("unhandled {event} message")]
    Other { event: String, api: Option<String> },
}

impl From<&ChannelFrame> for ServerMessage {
    fn from(frame: &ChannelFrame) -> Self {
        match frame.event.as_str() {
            STATUS_EVENT => match serde_json::from_value::<StatusReply>(frame.data.clone()) {
                Ok(reply) => ServerMessage::Status {
                    message: reply.message,
                },
                Err(_) => ServerMessage::Status {
                    message: frame.data.to_string(),
                },
            },
            PROJECT_EVENT => match serde_json::from_value::<ProjectReply>(frame.data.clone()) {
                Ok(ProjectReply {
                    api: Some(api),
                    exists: Some(exists),
                    seq,
                }) if api == CHECK_API => ServerMessage::ExistenceResult { exists, seq },
                Ok(reply) => ServerMessage::Other {
                    event: frame.event.clone(),
                    api: reply.api,
                },
                Err(_) => ServerMessage::Other {
                    event: frame.event.clone(),
                    api: None,
                },
            },
            _ => ServerMessage::Other {
                event: frame.event.clone(),
                api: None,
            },
        }
    }
}
