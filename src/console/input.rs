use crate::common::{RelayCommand, SenderRole};

pub const HELP: &str = "\
/reply <user-id> <text>   answer a user as expert
/delete <message-id>      remove a message
/accept <request-id>      join a waiting video call
/reject <request-id>      decline a waiting video call
/call <user-id> <name>    open a call request for a user
/read                     mark all messages read
/refresh                  poll the unread count now
/help                     show this list
/quit                     leave the console";

#[derive(Debug, Clone)]
pub enum InputAction {
    Command(RelayCommand),
    Help,
    Quit,
}

/// Parses one console line. `operator_id` signs replies.
pub fn parse_line(line: &str, operator_id: &str) -> Result<Option<InputAction>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let action = match verb {
        "/reply" => {
            let (user_id, text) = split_arg(rest).ok_or("usage: /reply <user-id> <text>")?;
            InputAction::Command(RelayCommand::SendMessage {
                conversation_key: user_id.to_string(),
                sender_id: operator_id.to_string(),
                sender_role: SenderRole::Expert,
                text: text.to_string(),
            })
        }
        "/delete" => InputAction::Command(RelayCommand::DeleteMessage(
            single_arg(rest).ok_or("usage: /delete <message-id>")?,
        )),
        "/accept" => InputAction::Command(RelayCommand::AcceptCall(
            single_arg(rest).ok_or("usage: /accept <request-id>")?,
        )),
        "/reject" => InputAction::Command(RelayCommand::RejectCall(
            single_arg(rest).ok_or("usage: /reject <request-id>")?,
        )),
        "/call" => {
            let (user_id, name) = split_arg(rest).ok_or("usage: /call <user-id> <name>")?;
            InputAction::Command(RelayCommand::RequestCall {
                user_id: user_id.to_string(),
                user_name: name.to_string(),
            })
        }
        "/read" => InputAction::Command(RelayCommand::MarkAllRead),
        "/refresh" => InputAction::Command(RelayCommand::RefreshUnread),
        "/help" => InputAction::Help,
        "/quit" | "/exit" => InputAction::Quit,
        other => return Err(format!("unknown command `{other}`, try /help")),
    };

    Ok(Some(action))
}

fn single_arg(rest: &str) -> Option<String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(arg), None) => Some(arg.to_string()),
        _ => None,
    }
}

fn split_arg(rest: &str) -> Option<(&str, &str)> {
    let (first, tail) = rest.split_once(char::is_whitespace)?;
    let tail = tail.trim();
    (!tail.is_empty()).then_some((first, tail))
}
