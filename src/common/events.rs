use crate::common::types::CallRequest;

/// Sự kiện từ relay service gửi lên console.
///
/// Live snapshots (threads, waiting calls) are not events; they are published
/// through the service's views so only the newest one is kept.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    CallStatusChanged(CallRequest),
    UnreadCount(u64),
    /// A user action failed. Nothing is retried.
    Alert(String),
    /// The backend rejected our token; the session is gone.
    LoggedOut,
}
