use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::common::{CallRequest, Message};
use crate::relay::Conversation;

use super::state::ConsoleState;

const PREVIEW_CHARS: usize = 48;

pub fn render(state: &ConsoleState) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "== Support inbox ({} unread) ==", state.unread);
    if state.logged_out {
        let _ = writeln!(out, "!! Session expired, run `login` again");
    }

    if state.conversations.is_empty() {
        let _ = writeln!(out, "  (no conversations)");
    }
    for conversation in &state.conversations {
        let _ = writeln!(out, "{}", conversation_line(conversation));
    }

    if !state.waiting_calls.is_empty() {
        let _ = writeln!(out, "-- Waiting video calls --");
        for call in &state.waiting_calls {
            let _ = writeln!(out, "{}", call_line(call));
        }
    }

    if let Some(call) = &state.last_call {
        let _ = writeln!(out, "Last call update: {} is {}", call.id, call.status);
    }

    out
}

pub fn conversation_line(conversation: &Conversation) -> String {
    let preview = conversation
        .last_message()
        .map(|message| format!("{}: {}", message.sender_role, preview(&message.text)))
        .unwrap_or_default();
    format!(
        "  [{}] {} message(s)  {}",
        conversation.key,
        conversation.messages.len(),
        preview
    )
}

pub fn message_line(message: &Message) -> String {
    format!(
        "{} {:<6} {} ({})",
        format_timestamp(message.timestamp),
        message.sender_role.as_str(),
        message.text,
        message.id
    )
}

pub fn call_line(call: &CallRequest) -> String {
    format!(
        "  {} {} ({}) room {} since {}",
        call.id,
        call.user_name,
        call.user_id,
        call.room_id,
        format_timestamp(call.created_at)
    )
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
