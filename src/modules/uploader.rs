use std::time::Duration;
use log::info;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use thiserror::Error;
use url::Url;
use crate::modules::types::{FormValue, UploadPayload};

pub const UPLOAD_PATH: &str = "/CyEx/vrnetz_upload";
pub const STATUS_PATH: &str = "/CyEx/status";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("upload transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Performs exactly one request per payload; never retries.
pub trait Uploader {
    fn upload(&self, payload: &UploadPayload) -> Result<String, UploadError>;
}

pub struct HttpUploader {
    client: Client,
    base: Url,
    headers: HeaderMap,
}

impl HttpUploader {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("cyex-upload/1.0"));
        headers.insert(REFERER, HeaderValue::from_str(base.as_str())?);

        Ok(Self {
            client,
            base: base.clone(),
            headers,
        })
    }

    pub fn upload_url(&self) -> Result<Url, UploadError> {
        Ok(self.base.join(UPLOAD_PATH)?)
    }

    /// Liveness probe of the extension.
    pub fn status(&self) -> Result<String, UploadError> {
        let url = self.base.join(STATUS_PATH)?;
        let body = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()?
            .error_for_status()?
            .text()?;
        Ok(body)
    }
}

fn multipart_form(payload: &UploadPayload) -> Form {
    payload
        .entries()
        .iter()
        .fold(Form::new(), |form, (name, value)| match value {
            FormValue::Text(text) => form.text(name.clone(), text.clone()),
            FormValue::File { file_name, bytes } => form.part(
                name.clone(),
                Part::bytes(bytes.clone()).file_name(file_name.clone()),
            ),
        })
}

impl Uploader for HttpUploader {
    fn upload(&self, payload: &UploadPayload) -> Result<String, UploadError> {
        let url = self.upload_url()?;
        info!("Posting {payload} to {url}");
        let body = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .multipart(multipart_form(payload))
            .send()?
            .error_for_status()?
            .text()?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_url_replaces_base_path() {
        let base = Url::parse("http://localhost:5000/upload/").unwrap();
        let uploader = HttpUploader::new(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(
            uploader.upload_url().unwrap().as_str(),
            "http://localhost:5000/CyEx/vrnetz_upload"
        );
    }
}
