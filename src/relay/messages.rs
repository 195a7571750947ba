use std::sync::Arc;

use crate::common::{Message, SenderRole};
use crate::error::{RelayError, RelayResult};
use crate::storage::{Collection, DocumentStore, MessageFilter, NewMessage, Subscription};

/// Reads and writes chat messages. Writes are visible to every subscriber
/// immediately; nothing is buffered locally.
#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<DocumentStore>,
}

impl MessageRepository {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    pub fn send(
        &self,
        conversation_key: &str,
        sender_id: &str,
        sender_role: SenderRole,
        text: &str,
    ) -> RelayResult<Message> {
        if text.trim().is_empty() {
            return Err(RelayError::Validation("message text is empty".to_string()));
        }
        if conversation_key.trim().is_empty() {
            return Err(RelayError::Validation(
                "conversation key is empty".to_string(),
            ));
        }

        let message = NewMessage {
            user_id: conversation_key.to_string(),
            sender_id: sender_id.to_string(),
            sender_role,
            text: text.to_string(),
        };

        self.store.insert_message(&message).map_err(|err| {
            log::error!("Failed to store message for {conversation_key}: {err}");
            RelayError::from(err)
        })
    }

    pub fn list(&self, filter: &MessageFilter) -> RelayResult<Vec<Message>> {
        Ok(self.store.messages(filter)?)
    }

    /// Delivers the full ordered message set for `filter` now and after every
    /// change, until the returned handle is released.
    pub fn subscribe<F>(&self, filter: MessageFilter, on_change: F) -> Subscription
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        Subscription::spawn(
            Arc::clone(&self.store),
            Collection::Messages,
            "messages",
            move |store| store.messages(&filter),
            on_change,
        )
    }

    pub fn delete(&self, message_id: &str) -> RelayResult<()> {
        if self.store.delete_message(message_id)? {
            log::info!("Deleted message {message_id}");
            Ok(())
        } else {
            Err(RelayError::not_found("message", message_id))
        }
    }
}
