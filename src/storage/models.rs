use rusqlite::Result as SqlResult;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::common::{CallStatus, SenderRole};

/// Collections of the document store. Change notifications carry one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Messages,
    CallRequests,
}

/// Equality filter for message queries and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    /// Messages whose conversation key (`user_id`) equals the value.
    Conversation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFilter {
    All,
    Status(CallStatus),
}

/// Insert payload; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: String,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub text: String,
}

impl ToSql for SenderRole {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SenderRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl ToSql for CallStatus {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CallStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}
