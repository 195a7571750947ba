use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::backend::ChatBackend;
use crate::common::{CallRequest, RelayCommand, RelayEvent};
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::storage::{DocumentStore, MessageFilter};

use super::calls::CallRelay;
use super::conversations::{Conversation, group_by_user};
use super::messages::MessageRepository;
use super::presence::UnreadCounter;

/// Latest live snapshots. A slow reader skips intermediate ones but always
/// ends up on the newest.
#[derive(Clone)]
pub struct RelayViews {
    pub conversations: watch::Receiver<Vec<Conversation>>,
    pub waiting_calls: watch::Receiver<Vec<CallRequest>>,
}

/// Event loop behind the operator console: executes commands, keeps the
/// live views running and polls the unread badge.
pub struct RelayService {
    messages: MessageRepository,
    calls: CallRelay,
    unread: UnreadCounter,
    backend: Arc<dyn ChatBackend>,
    poll_interval: Duration,
    conversations: watch::Sender<Vec<Conversation>>,
    waiting_calls: watch::Sender<Vec<CallRequest>>,
    event_sender: mpsc::Sender<RelayEvent>,
    command_receiver: mpsc::Receiver<RelayCommand>,
}

impl RelayService {
    pub fn new(
        store: Arc<DocumentStore>,
        backend: Arc<dyn ChatBackend>,
        config: &AppConfig,
        event_sender: mpsc::Sender<RelayEvent>,
        command_receiver: mpsc::Receiver<RelayCommand>,
    ) -> Self {
        Self {
            messages: MessageRepository::new(Arc::clone(&store)),
            calls: CallRelay::new(store, config.accept_grace(), config.reject_grace()),
            unread: UnreadCounter::new(Arc::clone(&backend)),
            backend,
            poll_interval: config.poll_interval(),
            conversations: watch::Sender::new(Vec::new()),
            waiting_calls: watch::Sender::new(Vec::new()),
            event_sender,
            command_receiver,
        }
    }

    pub fn views(&self) -> RelayViews {
        RelayViews {
            conversations: self.conversations.subscribe(),
            waiting_calls: self.waiting_calls.subscribe(),
        }
    }

    /// Runs until the command channel closes. Subscriptions and pending call
    /// cleanups end with the loop.
    pub async fn run(mut self) {
        let threads_tx = self.conversations.clone();
        let _threads = self.messages.subscribe(MessageFilter::All, move |snapshot| {
            threads_tx.send_replace(group_by_user(snapshot));
        });

        let calls_tx = self.waiting_calls.clone();
        let _waiting = self.calls.subscribe_waiting(move |waiting| {
            calls_tx.send_replace(waiting);
        });

        let mut poll = tokio::time::interval(self.poll_interval);
        log::info!("Relay event loop started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    } else {
                        break;
                    }
                }
                _ = poll.tick() => {
                    self.refresh_unread().await;
                }
            }
        }

        log::info!("Relay event loop stopped");
    }

    async fn handle_command(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::SendMessage {
                conversation_key,
                sender_id,
                sender_role,
                text,
            } => match self
                .messages
                .send(&conversation_key, &sender_id, sender_role, &text)
            {
                Ok(message) => {
                    if let Err(err) = self.backend.notify_message(&message).await {
                        self.report(err).await;
                    }
                }
                Err(err) => self.report(err).await,
            },
            RelayCommand::DeleteMessage(message_id) => {
                if let Err(err) = self.messages.delete(&message_id) {
                    self.report(err).await;
                }
            }
            RelayCommand::RequestCall { user_id, user_name } => {
                match self.calls.request_call(&user_id, &user_name) {
                    Ok(request) => {
                        let notified = self.backend.notify_video_call(&request).await;
                        self.emit(RelayEvent::CallStatusChanged(request)).await;
                        if let Err(err) = notified {
                            self.report(err).await;
                        }
                    }
                    Err(err) => self.report(err).await,
                }
            }
            RelayCommand::AcceptCall(request_id) => match self.calls.accept(&request_id) {
                Ok(request) => self.emit(RelayEvent::CallStatusChanged(request)).await,
                Err(err) => self.report(err).await,
            },
            RelayCommand::RejectCall(request_id) => match self.calls.reject(&request_id) {
                Ok(request) => self.emit(RelayEvent::CallStatusChanged(request)).await,
                Err(err) => self.report(err).await,
            },
            RelayCommand::RefreshUnread => self.refresh_unread().await,
            RelayCommand::MarkAllRead => {
                // The badge clears locally whether or not the backend agrees.
                self.emit(RelayEvent::UnreadCount(0)).await;
                if let Err(err) = self.unread.mark_all_read().await {
                    self.report(err).await;
                }
            }
        }
    }

    async fn refresh_unread(&mut self) {
        match self.unread.poll().await {
            Ok(count) => self.emit(RelayEvent::UnreadCount(count)).await,
            Err(err) if err.is_auth() => self.report(err).await,
            // Already logged; the previous count stays on screen.
            Err(_) => {}
        }
    }

    async fn report(&self, err: RelayError) {
        if err.is_auth() {
            self.emit(RelayEvent::LoggedOut).await;
        } else {
            log::warn!("Relay action failed: {err}");
            self.emit(RelayEvent::Alert(err.to_string())).await;
        }
    }

    async fn emit(&self, event: RelayEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify console: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::common::{CallStatus, SenderRole};
    use tokio::time::timeout;

    struct Harness {
        backend: Arc<FakeBackend>,
        commands: mpsc::Sender<RelayCommand>,
        events: mpsc::Receiver<RelayEvent>,
        views: RelayViews,
    }

    fn start(unread: u64) -> Harness {
        start_with_capacity(unread, 64)
    }

    fn start_with_capacity(unread: u64, event_capacity: usize) -> Harness {
        let store = Arc::new(DocumentStore::in_memory().unwrap());
        let backend = Arc::new(FakeBackend::with_unread(unread));
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(event_capacity);
        let service = RelayService::new(
            store,
            backend.clone(),
            &AppConfig::default(),
            event_tx,
            cmd_rx,
        );
        let views = service.views();
        tokio::spawn(service.run());
        Harness {
            backend,
            commands: cmd_tx,
            events: event_rx,
            views,
        }
    }

    /// Waits for the first event matching `pick`.
    async fn wait_for<T>(
        events: &mut mpsc::Receiver<RelayEvent>,
        mut pick: impl FnMut(RelayEvent) -> Option<T>,
    ) -> T {
        timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.expect("service stopped");
                if let Some(found) = pick(event) {
                    return found;
                }
            }
        })
        .await
        .expect("event not received")
    }

    #[tokio::test]
    async fn sent_message_shows_up_in_threads_and_notifies_backend() {
        let mut h = start(0);
        h.commands
            .send(RelayCommand::SendMessage {
                conversation_key: "u1".to_string(),
                sender_id: "u1".to_string(),
                sender_role: SenderRole::User,
                text: "cannot sleep".to_string(),
            })
            .await
            .unwrap();

        let threads = timeout(
            Duration::from_secs(2),
            h.views.conversations.wait_for(|threads| !threads.is_empty()),
        )
        .await
        .expect("threads not updated")
        .unwrap()
        .clone();
        assert_eq!(threads[0].key, "u1");
        assert_eq!(threads[0].messages[0].text, "cannot sleep");

        timeout(Duration::from_secs(2), async {
            while h.backend.notified_messages.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend was not notified");
    }

    #[tokio::test]
    async fn blank_message_raises_alert() {
        let mut h = start(0);
        h.commands
            .send(RelayCommand::SendMessage {
                conversation_key: "u1".to_string(),
                sender_id: "u1".to_string(),
                sender_role: SenderRole::User,
                text: " ".to_string(),
            })
            .await
            .unwrap();

        let alert = wait_for(&mut h.events, |event| match event {
            RelayEvent::Alert(text) => Some(text),
            _ => None,
        })
        .await;
        assert!(alert.contains("empty"));
    }

    #[tokio::test]
    async fn call_request_then_accept_emits_both_statuses() {
        let mut h = start(0);
        h.commands
            .send(RelayCommand::RequestCall {
                user_id: "u1".to_string(),
                user_name: "Ali".to_string(),
            })
            .await
            .unwrap();

        let request = wait_for(&mut h.events, |event| match event {
            RelayEvent::CallStatusChanged(request) => Some(request),
            _ => None,
        })
        .await;
        assert_eq!(request.status, CallStatus::Waiting);
        assert_eq!(h.backend.notified_calls.lock().as_slice(), [request.id.clone()]);

        h.commands
            .send(RelayCommand::AcceptCall(request.id.clone()))
            .await
            .unwrap();
        let accepted = wait_for(&mut h.events, |event| match event {
            RelayEvent::CallStatusChanged(request) => Some(request),
            _ => None,
        })
        .await;
        assert_eq!(accepted.id, request.id);
        assert_eq!(accepted.status, CallStatus::Accepted);
    }

    #[tokio::test]
    async fn poll_then_mark_all_read_shows_zero() {
        let mut h = start(3);
        let first = wait_for(&mut h.events, |event| match event {
            RelayEvent::UnreadCount(count) => Some(count),
            _ => None,
        })
        .await;
        assert_eq!(first, 3);

        h.commands.send(RelayCommand::MarkAllRead).await.unwrap();
        let cleared = wait_for(&mut h.events, |event| match event {
            RelayEvent::UnreadCount(count) => Some(count),
            _ => None,
        })
        .await;
        assert_eq!(cleared, 0);
    }

    fn message_count(threads: &[Conversation]) -> usize {
        threads.iter().map(|thread| thread.messages.len()).sum()
    }

    #[tokio::test]
    async fn slow_console_still_ends_on_newest_threads() {
        // Nobody reads events while the commands run.
        let mut h = start_with_capacity(0, 4);
        for n in 0..10 {
            h.commands
                .send(RelayCommand::SendMessage {
                    conversation_key: format!("u{}", n % 3),
                    sender_id: "u".to_string(),
                    sender_role: SenderRole::User,
                    text: format!("message {n}"),
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let threads = timeout(
            Duration::from_secs(2),
            h.views
                .conversations
                .wait_for(|threads| message_count(threads) == 10),
        )
        .await
        .expect("newest snapshot not published")
        .unwrap()
        .clone();
        assert_eq!(threads.len(), 3);

        let doomed = threads[0].messages[0].id.clone();
        h.commands
            .send(RelayCommand::DeleteMessage(doomed.clone()))
            .await
            .unwrap();
        let threads = timeout(
            Duration::from_secs(2),
            h.views
                .conversations
                .wait_for(|threads| message_count(threads) == 9),
        )
        .await
        .expect("deletion not published")
        .unwrap()
        .clone();
        assert!(
            threads
                .iter()
                .flat_map(|thread| &thread.messages)
                .all(|message| message.id != doomed)
        );
    }

    #[tokio::test]
    async fn answered_call_leaves_waiting_view() {
        let mut h = start(0);
        h.commands
            .send(RelayCommand::RequestCall {
                user_id: "u1".to_string(),
                user_name: "Ali".to_string(),
            })
            .await
            .unwrap();
        let waiting = timeout(
            Duration::from_secs(2),
            h.views.waiting_calls.wait_for(|calls| calls.len() == 1),
        )
        .await
        .expect("call not published")
        .unwrap()
        .clone();

        h.commands
            .send(RelayCommand::RejectCall(waiting[0].id.clone()))
            .await
            .unwrap();
        timeout(
            Duration::from_secs(2),
            h.views.waiting_calls.wait_for(|calls| calls.is_empty()),
        )
        .await
        .expect("rejected call still waiting")
        .unwrap();
    }
}
