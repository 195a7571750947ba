use std::collections::HashMap;

use serde::Serialize;

use crate::common::Message;

/// Bucket for messages that carry neither a user id nor a sender id.
pub const UNKNOWN_CONVERSATION: &str = "unknown";

/// Per-user thread derived from a message snapshot. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub key: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Key a message is grouped under: its conversation key, else its sender.
pub fn conversation_key(message: &Message) -> &str {
    message
        .user_id
        .as_deref()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| Some(message.sender_id.as_str()).filter(|id| !id.trim().is_empty()))
        .unwrap_or(UNKNOWN_CONVERSATION)
}

/// Partitions a snapshot into threads in order of first appearance.
/// Messages keep their input order; nothing is re-sorted.
pub fn group_by_user(messages: Vec<Message>) -> Vec<Conversation> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut conversations: Vec<Conversation> = Vec::new();

    for message in messages {
        let key = conversation_key(&message).to_string();
        let slot = *slots.entry(key).or_insert_with_key(|key| {
            conversations.push(Conversation {
                key: key.clone(),
                messages: Vec::new(),
            });
            conversations.len() - 1
        });
        conversations[slot].messages.push(message);
    }

    conversations
}
