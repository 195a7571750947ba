use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// Who wrote a message: the tracked user or the support expert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Expert,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Expert => "expert",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderRole {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "expert" => Ok(Self::Expert),
            other => Err(RelayError::Validation(format!("unknown sender role `{other}`"))),
        }
    }
}

/// A chat message document. Only deletion mutates it after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Conversation key. Older documents were written without it.
    pub user_id: Option<String>,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub text: String,
    /// UTC milliseconds, assigned by the store.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Waiting,
    Accepted,
    Rejected,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Validates a status change. Only `Waiting` may move, and only forward.
    pub fn transition(self, next: CallStatus) -> RelayResult<CallStatus> {
        match (self, next) {
            (Self::Waiting, Self::Accepted) | (Self::Waiting, Self::Rejected) => Ok(next),
            (from, to) => Err(RelayError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(RelayError::Validation(format!("unknown call status `{other}`"))),
        }
    }
}

/// Transient signaling record for a video-support session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub room_id: String,
    pub status: CallStatus,
    /// UTC milliseconds.
    pub created_at: i64,
}
