use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::common::{CallRequest, CallStatus};
use crate::error::{RelayError, RelayResult};
use crate::storage::{CallFilter, Collection, DocumentStore, Subscription};

pub const ACCEPT_GRACE: Duration = Duration::from_secs(10);
pub const REJECT_GRACE: Duration = Duration::from_secs(2);

const ROOM_PREFIX: &str = "sleepwell";

/// Video-call signaling: creates call requests, moves them out of `waiting`
/// and removes them once their grace window has passed.
///
/// Cleanup timers belong to the relay. Dropping it aborts the ones still
/// pending; [`CallRelay::drain`] waits for them instead.
pub struct CallRelay {
    store: Arc<DocumentStore>,
    accept_grace: Duration,
    reject_grace: Duration,
    cleanups: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CallRelay {
    pub fn new(store: Arc<DocumentStore>, accept_grace: Duration, reject_grace: Duration) -> Self {
        Self {
            store,
            accept_grace,
            reject_grace,
            cleanups: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_grace(store: Arc<DocumentStore>) -> Self {
        Self::new(store, ACCEPT_GRACE, REJECT_GRACE)
    }

    pub fn request_call(&self, user_id: &str, user_name: &str) -> RelayResult<CallRequest> {
        if user_id.trim().is_empty() {
            return Err(RelayError::Validation("user id is empty".to_string()));
        }

        let request = CallRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            room_id: new_room_id(),
            status: CallStatus::Waiting,
            created_at: Utc::now().timestamp_millis(),
        };

        self.store.insert_call_request(&request).map_err(|err| {
            log::error!("Failed to create call request for {user_id}: {err}");
            RelayError::from(err)
        })?;
        log::info!("Call request {} waiting in room {}", request.id, request.room_id);
        Ok(request)
    }

    /// Operator joins. The record is removed after the accept grace window.
    pub fn accept(&self, request_id: &str) -> RelayResult<CallRequest> {
        self.transition(request_id, CallStatus::Accepted, self.accept_grace)
            .inspect_err(|err| log::error!("Failed to accept call {request_id}: {err}"))
    }

    /// Operator declines. The record is removed after the reject grace window.
    pub fn reject(&self, request_id: &str) -> RelayResult<CallRequest> {
        self.transition(request_id, CallStatus::Rejected, self.reject_grace)
            .inspect_err(|err| log::error!("Failed to reject call {request_id}: {err}"))
    }

    fn transition(&self, request_id: &str, next: CallStatus, grace: Duration) -> RelayResult<CallRequest> {
        let current = self.get(request_id)?;
        current.status.transition(next)?;

        if !self.store.update_call_status(request_id, current.status, next)? {
            // Someone else moved or removed it between the read and the write.
            let latest = self.get(request_id)?;
            return Err(RelayError::InvalidTransition {
                from: latest.status,
                to: next,
            });
        }

        self.schedule_cleanup(request_id, grace);
        log::info!("Call request {request_id} is now {next}");
        Ok(CallRequest {
            status: next,
            ..current
        })
    }

    fn schedule_cleanup(&self, request_id: &str, grace: Duration) {
        let store = Arc::clone(&self.store);
        let id = request_id.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match store.delete_call_request(&id) {
                Ok(true) => log::debug!("Call request {id} removed after {grace:?}"),
                Ok(false) => log::debug!("Call request {id} was already gone"),
                Err(err) => log::error!("Failed to remove call request {id}: {err}"),
            }
        });

        let mut cleanups = self.cleanups.lock();
        cleanups.retain(|_, task| !task.is_finished());
        cleanups.insert(request_id.to_string(), task);
    }

    /// Cleanup timers that have not fired yet.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups
            .lock()
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Waits for every scheduled cleanup to run.
    pub async fn drain(&self) {
        let tasks: Vec<_> = self.cleanups.lock().drain().map(|(_, task)| task).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    log::warn!("Call cleanup task failed: {err}");
                }
            }
        }
    }

    pub fn get(&self, request_id: &str) -> RelayResult<CallRequest> {
        self.store
            .call_request(request_id)?
            .ok_or_else(|| RelayError::not_found("call request", request_id))
    }

    pub fn list(&self, filter: CallFilter) -> RelayResult<Vec<CallRequest>> {
        Ok(self.store.call_requests(filter)?)
    }

    /// Live view of requests still waiting for an operator, oldest first.
    pub fn subscribe_waiting<F>(&self, on_change: F) -> Subscription
    where
        F: FnMut(Vec<CallRequest>) + Send + 'static,
    {
        Subscription::spawn(
            Arc::clone(&self.store),
            Collection::CallRequests,
            "waiting-calls",
            |store| store.call_requests(CallFilter::Status(CallStatus::Waiting)),
            on_change,
        )
    }
}

impl Drop for CallRelay {
    fn drop(&mut self) {
        for (id, task) in self.cleanups.lock().drain() {
            if !task.is_finished() {
                log::debug!("Cancelling cleanup of call request {id}");
                task.abort();
            }
        }
    }
}

fn new_room_id() -> String {
    format!("{ROOM_PREFIX}-{}", Uuid::new_v4().simple())
}

/// Conference link for a call request, with the participant's display name.
pub fn join_url(conference_base: &str, request: &CallRequest, display_name: &str) -> RelayResult<Url> {
    let mut url =
        Url::parse(conference_base).map_err(|err| RelayError::Url(format!("{conference_base}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| RelayError::Url(format!("{conference_base} cannot carry a room path")))?
        .pop_if_empty()
        .push(&request.room_id);
    url.set_fragment(Some(&format!("userInfo.displayName=\"{display_name}\"")));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> (Arc<DocumentStore>, CallRelay) {
        let store = Arc::new(DocumentStore::in_memory().unwrap());
        let relay = CallRelay::with_default_grace(Arc::clone(&store));
        (store, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_request_is_deleted_after_grace_window() {
        let (store, relay) = relay();
        let request = relay.request_call("u1", "Ali").unwrap();
        assert_eq!(request.status, CallStatus::Waiting);

        let accepted = relay.accept(&request.id).unwrap();
        assert_eq!(accepted.status, CallStatus::Accepted);
        assert_eq!(relay.get(&request.id).unwrap().status, CallStatus::Accepted);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(store.call_request(&request.id).unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.call_request(&request.id).unwrap().is_none());
        assert_eq!(relay.pending_cleanups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_request_uses_shorter_grace_window() {
        let (store, relay) = relay();
        let request = relay.request_call("u1", "Ali").unwrap();
        relay.reject(&request.id).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            store.call_request(&request.id).unwrap().map(|r| r.status),
            Some(CallStatus::Rejected)
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(relay.list(CallFilter::All).unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_never_returns_to_waiting() {
        let (_store, relay) = relay();
        let request = relay.request_call("u1", "Ali").unwrap();
        relay.reject(&request.id).unwrap();

        let err = relay.accept(&request.id).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidTransition {
                from: CallStatus::Rejected,
                to: CallStatus::Accepted
            }
        ));
        assert_eq!(relay.get(&request.id).unwrap().status, CallStatus::Rejected);
    }

    #[tokio::test]
    async fn accepting_unknown_request_is_not_found() {
        let (_store, relay) = relay();
        assert!(matches!(
            relay.accept("missing"),
            Err(RelayError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_relay_cancels_pending_cleanups() {
        let (store, relay) = relay();
        let request = relay.request_call("u1", "Ali").unwrap();
        relay.accept(&request.id).unwrap();
        drop(relay);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(store.call_request(&request.id).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_cleanups() {
        let (store, relay) = relay();
        let request = relay.request_call("u1", "Ali").unwrap();
        relay.accept(&request.id).unwrap();

        relay.drain().await;
        assert!(store.call_request(&request.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn room_ids_are_not_derived_from_identity() {
        let (_store, relay) = relay();
        let a = relay.request_call("u1", "Ali").unwrap();
        let b = relay.request_call("u1", "Ali").unwrap();
        assert_ne!(a.room_id, b.room_id);
        assert!(!a.room_id.contains("u1"));
        assert!(a.room_id.starts_with("sleepwell-"));
    }

    #[tokio::test]
    async fn waiting_subscription_drops_answered_requests() {
        let (_store, relay) = relay();
        let first = relay.request_call("u1", "Ali").unwrap();
        let second = relay.request_call("u2", "Sara").unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _subscription = relay.subscribe_waiting(move |waiting| {
            let _ = tx.send(waiting);
        });
        assert_eq!(rx.recv().await.unwrap().len(), 2);

        relay.accept(&first.id).unwrap();
        let waiting = rx.recv().await.unwrap();
        assert_eq!(waiting, vec![second]);
    }

    #[test]
    fn join_url_carries_room_and_display_name() {
        let request = CallRequest {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            user_name: "Ali".to_string(),
            room_id: "sleepwell-abc".to_string(),
            status: CallStatus::Waiting,
            created_at: 0,
        };
        let url = join_url("https://meet.jit.si", &request, "Ali").unwrap();
        assert_eq!(
            url.as_str(),
            "https://meet.jit.si/sleepwell-abc#userInfo.displayName=%22Ali%22"
        );
    }
}
