use std::sync::Arc;
use std::time::Duration;

use rusqlite::Result as SqlResult;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::document_store::DocumentStore;
use super::models::Collection;

/// How often a subscription checks for commits made by other processes.
const EXTERNAL_WRITE_POLL: Duration = Duration::from_millis(500);

/// Live query handle. Delivery stops when the handle is released or dropped.
pub struct Subscription {
    label: &'static str,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawns a task that runs `query` once immediately and again after every
    /// change to `collection`, handing each full result set to `on_change`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn<T, Q, F>(
        store: Arc<DocumentStore>,
        collection: Collection,
        label: &'static str,
        query: Q,
        mut on_change: F,
    ) -> Self
    where
        T: Send + 'static,
        Q: Fn(&DocumentStore) -> SqlResult<Vec<T>> + Send + 'static,
        F: FnMut(Vec<T>) + Send + 'static,
    {
        // Subscribe before the first query so no change falls in between.
        let mut changes = store.changes();

        let task = tokio::spawn(async move {
            let store: &DocumentStore = &store;
            let mut last_version = store.data_version().unwrap_or_default();
            let mut external = tokio::time::interval(EXTERNAL_WRITE_POLL);
            external.set_missed_tick_behavior(MissedTickBehavior::Skip);

            deliver(store, label, &query, &mut on_change);

            loop {
                tokio::select! {
                    change = changes.recv() => match change {
                        Ok(changed) if changed == collection => {
                            deliver(store, label, &query, &mut on_change);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!("Subscription `{label}` lagged by {skipped} changes");
                            deliver(store, label, &query, &mut on_change);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = external.tick() => match store.data_version() {
                        Ok(version) if version != last_version => {
                            last_version = version;
                            deliver(store, label, &query, &mut on_change);
                        }
                        Ok(_) => {}
                        Err(err) => log::warn!("Subscription `{label}` version check failed: {err}"),
                    },
                }
            }
        });

        log::debug!("Subscription `{label}` started");
        Self {
            label,
            task: Some(task),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops delivery. Equivalent to dropping the handle.
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Subscription `{}` released", self.label);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

fn deliver<T, Q, F>(store: &DocumentStore, label: &str, query: &Q, on_change: &mut F)
where
    Q: Fn(&DocumentStore) -> SqlResult<Vec<T>>,
    F: FnMut(Vec<T>),
{
    match query(store) {
        Ok(snapshot) => on_change(snapshot),
        Err(err) => log::error!("Subscription `{label}` query failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SenderRole;
    use crate::storage::{MessageFilter, NewMessage};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn commits_from_another_connection_are_delivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.db");
        let watched = Arc::new(DocumentStore::open(&path).unwrap());
        let writer = DocumentStore::open(&path).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = Subscription::spawn(
            watched,
            Collection::Messages,
            "test",
            |store| store.messages(&MessageFilter::All),
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
        );

        let first = rx.recv().await.unwrap();
        assert!(first.is_empty());

        // The writer has its own broadcast channel, so only the version check
        // can pick this up.
        writer
            .insert_message(&NewMessage {
                user_id: "u1".to_string(),
                sender_id: "u1".to_string(),
                sender_role: SenderRole::User,
                text: "hello from elsewhere".to_string(),
            })
            .unwrap();

        let snapshot = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = rx.recv().await.unwrap();
                if !snapshot.is_empty() {
                    break snapshot;
                }
            }
        })
        .await
        .expect("external commit was not delivered");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "hello from elsewhere");

        subscription.release();
    }
}
