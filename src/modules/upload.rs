use derive_more::with_trait::Display;
use log::{debug, error, info};
use thiserror::Error;
use crate::modules::layouts::LayoutSource;
use crate::modules::session::Session;
use crate::modules::types::{Form, UploadPayload};
use crate::modules::uploader::{UploadError, Uploader};

pub const UPLOAD_FAILED: &str = "Upload failed";
pub const OVERWRITE_FIELD: &str = "overwrite";
pub const JOB_FIELD: &str = "job";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubmissionState {
    #[display("idle")]
    Idle,
    #[display("assembling")]
    Assembling,
    #[display("in flight")]
    InFlight,
    #[display("succeeded")]
    Succeeded,
    #[display("failed")]
    Failed,
}

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("an upload is already in flight")]
    InFlight,
    #[error("no upload in flight (state {0})")]
    NotInFlight(SubmissionState),
}

/// Builds the multipart payload for one submission.
///
/// Layout indices come from the order of `layouts` at call time, so the
/// caller passes the live list rather than anything cached. Layouts without
/// fields are skipped and do not consume an index.
///
/// `overwrite`, and `job` when the session has one, are owned by the
/// assembler: form fields of the same name are dropped.
pub fn assemble_payload<L: LayoutSource>(
    form: &Form,
    session: &Session,
    layouts: &[L],
    overwrite: bool,
) -> UploadPayload {
    let job = session.job();
    let mut payload = UploadPayload::default();
    for (name, value) in form.entries() {
        if name == OVERWRITE_FIELD || (name == JOB_FIELD && job.is_some()) {
            debug!("Dropping form field {name}={value}");
            continue;
        }
        payload.append(name.clone(), value.clone());
    }
    if let Some(job) = job {
        payload.append_text(JOB_FIELD, job);
    }
    let descriptors = layouts
        .iter()
        .map(|layout| layout.layout_data())
        .filter(|fields| !fields.is_empty());
    for (index, fields) in descriptors.enumerate() {
        for (key, value) in fields {
            payload.append_text(format!("layout_{}_{key}", index + 1), value);
        }
    }
    payload.append_text(OVERWRITE_FIELD, overwrite.to_string());
    payload
}

/// Drives one submission at a time through
/// `Idle -> Assembling -> InFlight -> Succeeded | Failed`.
pub struct UploadAssembler<U: Uploader> {
    uploader: U,
    session: Session,
    state: SubmissionState,
    message: Option<String>,
}

impl<U: Uploader> UploadAssembler<U> {
    pub fn new(uploader: U, session: Session) -> Self {
        Self {
            uploader,
            session,
            state: SubmissionState::Idle,
            message: None,
        }
    }

    /// Snapshots the form and layouts into a payload and marks the
    /// submission in flight. Refused while another one is in flight.
    pub fn begin<L: LayoutSource>(
        &mut self,
        form: &Form,
        layouts: &[L],
        overwrite: bool,
    ) -> Result<UploadPayload, SubmitError> {
        if self.state == SubmissionState::InFlight {
            return Err(SubmitError::InFlight);
        }
        self.state = SubmissionState::Assembling;
        let payload = assemble_payload(form, &self.session, layouts, overwrite);
        self.state = SubmissionState::InFlight;
        Ok(payload)
    }

    /// Records the terminal response and returns the message-area content.
    pub fn finish(&mut self, result: Result<String, UploadError>) -> Result<&str, SubmitError> {
        if self.state != SubmissionState::InFlight {
            return Err(SubmitError::NotInFlight(self.state));
        }
        let message = match result {
            Ok(body) => {
                info!("Upload succeeded");
                self.state = SubmissionState::Succeeded;
                body
            }
            Err(e) => {
                error!("Upload failed: {e}");
                self.state = SubmissionState::Failed;
                UPLOAD_FAILED.to_string()
            }
        };
        Ok(self.message.insert(message).as_str())
    }

    pub fn on_submit<L: LayoutSource>(
        &mut self,
        form: &Form,
        layouts: &[L],
        overwrite: bool,
    ) -> Result<&str, SubmitError> {
        let payload = self.begin(form, layouts, overwrite)?;
        let result = self.uploader.upload(&payload);
        self.finish(result)
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
