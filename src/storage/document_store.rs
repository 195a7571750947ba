use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqlResult, Row, params};
use std::path::Path;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::common::{CallRequest, CallStatus, Message};

use super::database::Database;
use super::models::{CallFilter, Collection, MessageFilter, NewMessage};

const CHANGE_CAPACITY: usize = 64;

/// Document store for the relay (messages and call requests).
///
/// Every mutation is broadcast as a [`Collection`] change so live
/// subscriptions in this process can re-query. Writes from other processes
/// are picked up through `data_version`.
pub struct DocumentStore {
    db: Database,
    changes: broadcast::Sender<Collection>,
}

impl DocumentStore {
    /// Open (or create) the store at a file path
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Self::with_database(Database::new(path)?)
    }

    pub fn in_memory() -> SqlResult<Self> {
        Self::with_database(Database::in_memory()?)
    }

    fn with_database(db: Database) -> SqlResult<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let store = Self { db, changes };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SqlResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    user_id TEXT,
                    sender_id TEXT NOT NULL,
                    sender_role TEXT NOT NULL,
                    text TEXT NOT NULL,
                    timestamp INTEGER NOT NULL
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS call_requests (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    user_name TEXT NOT NULL,
                    room_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'waiting',
                    created_at INTEGER NOT NULL
                )",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_messages_user_timestamp ON messages(user_id, timestamp)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_call_requests_status ON call_requests(status, created_at)",
                [],
            )?;

            Ok(())
        })
    }

    /// Receiver for change notifications of both collections.
    pub fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    /// Changes whenever another connection commits to the database file.
    pub fn data_version(&self) -> SqlResult<i64> {
        self.db
            .with_conn(|conn| conn.query_row("PRAGMA data_version", [], |row| row.get(0)))
    }

    fn notify(&self, collection: Collection) {
        // No receivers just means nobody is subscribed.
        let _ = self.changes.send(collection);
    }

    // ========== Messages ==========

    pub fn insert_message(&self, message: &NewMessage) -> SqlResult<Message> {
        let stored = Message {
            id: Uuid::new_v4().to_string(),
            user_id: Some(message.user_id.clone()),
            sender_id: message.sender_id.clone(),
            sender_role: message.sender_role,
            text: message.text.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, sender_id, sender_role, text, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.id,
                    stored.user_id,
                    stored.sender_id,
                    stored.sender_role,
                    stored.text,
                    stored.timestamp
                ],
            )
        })?;

        self.notify(Collection::Messages);
        Ok(stored)
    }

    /// Messages matching `filter`, ascending by timestamp then insertion.
    pub fn messages(&self, filter: &MessageFilter) -> SqlResult<Vec<Message>> {
        self.db.with_conn(|conn| match filter {
            MessageFilter::All => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, sender_id, sender_role, text, timestamp
                     FROM messages
                     ORDER BY timestamp ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([], message_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(rows)
            }
            MessageFilter::Conversation(user_id) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, sender_id, sender_role, text, timestamp
                     FROM messages
                     WHERE user_id = ?1
                     ORDER BY timestamp ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(params![user_id], message_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(rows)
            }
        })
    }

    /// Returns false when no message had that id.
    pub fn delete_message(&self, id: &str) -> SqlResult<bool> {
        let removed = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM messages WHERE id = ?1", params![id]))?;
        if removed > 0 {
            self.notify(Collection::Messages);
        }
        Ok(removed > 0)
    }

    // ========== Call requests ==========

    pub fn insert_call_request(&self, request: &CallRequest) -> SqlResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO call_requests (id, user_id, user_name, room_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.id,
                    request.user_id,
                    request.user_name,
                    request.room_id,
                    request.status,
                    request.created_at
                ],
            )
        })?;
        self.notify(Collection::CallRequests);
        Ok(())
    }

    pub fn call_request(&self, id: &str) -> SqlResult<Option<CallRequest>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, user_name, room_id, status, created_at
                 FROM call_requests WHERE id = ?1",
                params![id],
                call_request_from_row,
            )
            .optional()
        })
    }

    pub fn call_requests(&self, filter: CallFilter) -> SqlResult<Vec<CallRequest>> {
        self.db.with_conn(|conn| match filter {
            CallFilter::All => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, user_name, room_id, status, created_at
                     FROM call_requests
                     ORDER BY created_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([], call_request_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(rows)
            }
            CallFilter::Status(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, user_name, room_id, status, created_at
                     FROM call_requests
                     WHERE status = ?1
                     ORDER BY created_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(params![status], call_request_from_row)?
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(rows)
            }
        })
    }

    /// Compare-and-set on the status column. Returns false when the row is
    /// missing or no longer in `from`.
    pub fn update_call_status(&self, id: &str, from: CallStatus, to: CallStatus) -> SqlResult<bool> {
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE call_requests SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to, id, from],
            )
        })?;
        if updated > 0 {
            self.notify(Collection::CallRequests);
        }
        Ok(updated > 0)
    }

    pub fn delete_call_request(&self, id: &str) -> SqlResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM call_requests WHERE id = ?1", params![id])
        })?;
        if removed > 0 {
            self.notify(Collection::CallRequests);
        }
        Ok(removed > 0)
    }
}

fn message_from_row(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_role: row.get(3)?,
        text: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn call_request_from_row(row: &Row<'_>) -> SqlResult<CallRequest> {
    Ok(CallRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        room_id: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}
