use crate::common::{CallRequest, RelayEvent};
use crate::relay::Conversation;

/// Trạng thái cục bộ của console.
#[derive(Debug, Default)]
pub struct ConsoleState {
    pub conversations: Vec<Conversation>,
    pub waiting_calls: Vec<CallRequest>,
    pub unread: u64,
    pub alerts: Vec<String>,
    pub last_call: Option<CallRequest>,
    pub logged_out: bool,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the view. Returns false when nothing visible changed.
    pub fn apply(&mut self, event: RelayEvent) -> bool {
        match event {
            RelayEvent::CallStatusChanged(request) => {
                self.last_call = Some(request);
            }
            RelayEvent::UnreadCount(count) => {
                if self.unread == count {
                    return false;
                }
                self.unread = count;
            }
            RelayEvent::Alert(message) => self.alerts.push(message),
            RelayEvent::LoggedOut => {
                if self.logged_out {
                    return false;
                }
                self.logged_out = true;
            }
        }
        true
    }

    pub fn show_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
    }

    pub fn show_waiting_calls(&mut self, calls: Vec<CallRequest>) {
        self.waiting_calls = calls;
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_logout_is_reported_once() {
        let mut state = ConsoleState::new();
        assert!(state.apply(RelayEvent::LoggedOut));
        assert!(!state.apply(RelayEvent::LoggedOut));
    }

    #[test]
    fn unchanged_unread_count_needs_no_redraw() {
        let mut state = ConsoleState::new();
        assert!(state.apply(RelayEvent::UnreadCount(3)));
        assert!(!state.apply(RelayEvent::UnreadCount(3)));
        assert!(state.apply(RelayEvent::UnreadCount(0)));
        assert_eq!(state.unread, 0);
    }

    #[test]
    fn alerts_are_drained_once() {
        let mut state = ConsoleState::new();
        state.apply(RelayEvent::Alert("store down".to_string()));
        assert_eq!(state.take_alerts(), ["store down"]);
        assert!(state.take_alerts().is_empty());
    }
}
