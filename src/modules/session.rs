use derive_more::with_trait::Display;
use rand::distributions::Alphanumeric;
use rand::Rng;

const UID_LENGTH: usize = 10;

/// Per-session token correlating existence checks to this client.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(UID_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Context shared by the existence checker and the upload assembler.
#[derive(Debug, Clone, Display)]
#[display("session {uid}")]
pub struct Session {
    uid: SessionId,
    job: Option<String>,
}

impl Session {
    pub fn new(job: Option<String>) -> Self {
        Self::with_uid(SessionId::generate(), job)
    }

    pub fn with_uid(uid: SessionId, job: Option<String>) -> Self {
        Self {
            uid,
            job: job.filter(|j| !j.is_empty()),
        }
    }

    pub fn uid(&self) -> &SessionId {
        &self.uid
    }

    pub fn job(&self) -> Option<&str> {
        self.job.as_deref()
    }
}
