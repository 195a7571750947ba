use crate::common::types::SenderRole;

/// Lệnh từ console gửi xuống relay service.
#[derive(Debug, Clone)]
pub enum RelayCommand {
    SendMessage {
        conversation_key: String,
        sender_id: String,
        sender_role: SenderRole,
        text: String,
    },
    DeleteMessage(String),
    RequestCall {
        user_id: String,
        user_name: String,
    },
    AcceptCall(String),
    RejectCall(String),
    /// Poll the unread counter now instead of waiting for the next tick.
    RefreshUnread,
    MarkAllRead,
}
