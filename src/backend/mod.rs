pub mod client;
pub mod session;

pub use client::{ChatBackend, HttpBackend, Registration, UserSummary};
pub use session::{Session, SessionStore};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::ChatBackend;
    use crate::common::{CallRequest, Message};
    use crate::error::{RelayError, RelayResult};

    /// In-process stand-in for the REST backend.
    #[derive(Default)]
    pub struct FakeBackend {
        pub unread: AtomicU64,
        pub fail_polls: AtomicBool,
        pub mark_calls: AtomicUsize,
        pub notified_messages: Mutex<Vec<String>>,
        pub notified_calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        pub fn with_unread(count: u64) -> Self {
            let backend = Self::default();
            backend.unread.store(count, Ordering::SeqCst);
            backend
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn unread_count(&self) -> RelayResult<u64> {
            if self.fail_polls.load(Ordering::SeqCst) {
                return Err(RelayError::Backend {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.unread.load(Ordering::SeqCst))
        }

        async fn mark_all_read(&self) -> RelayResult<()> {
            self.mark_calls.fetch_add(1, Ordering::SeqCst);
            self.unread.store(0, Ordering::SeqCst);
            Ok(())
        }

        async fn notify_message(&self, message: &Message) -> RelayResult<()> {
            self.notified_messages.lock().push(message.id.clone());
            Ok(())
        }

        async fn notify_video_call(&self, request: &CallRequest) -> RelayResult<()> {
            self.notified_calls.lock().push(request.id.clone());
            Ok(())
        }
    }
}
