use thiserror::Error;

use crate::common::CallStatus;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// 401/403 from the backend. The session has already been cleared.
    #[error("unauthorized, session cleared")]
    Unauthorized,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("call request cannot move from {from} to {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        RelayError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Authorization failures end the session instead of being shown as alerts.
    pub fn is_auth(&self) -> bool {
        matches!(self, RelayError::Unauthorized | RelayError::NotLoggedIn)
    }
}
