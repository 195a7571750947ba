use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::ChatBackend;
use crate::error::RelayResult;

/// Unread-message badge. The backend owns the real count; this only keeps
/// what is currently displayed.
pub struct UnreadCounter {
    backend: Arc<dyn ChatBackend>,
    displayed: AtomicU64,
}

impl UnreadCounter {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            displayed: AtomicU64::new(0),
        }
    }

    /// One request to the backend. A failure keeps the previous count.
    pub async fn poll(&self) -> RelayResult<u64> {
        match self.backend.unread_count().await {
            Ok(count) => {
                self.displayed.store(count, Ordering::Relaxed);
                Ok(count)
            }
            Err(err) => {
                log::error!(
                    "Unread count poll failed, keeping {}: {err}",
                    self.displayed()
                );
                Err(err)
            }
        }
    }

    /// Clears the badge first, then tells the backend. The badge stays at zero
    /// even if the backend call fails.
    pub async fn mark_all_read(&self) -> RelayResult<()> {
        self.displayed.store(0, Ordering::Relaxed);
        self.backend
            .mark_all_read()
            .await
            .inspect_err(|err| log::error!("Failed to mark messages read: {err}"))
    }

    pub fn displayed(&self) -> u64 {
        self.displayed.load(Ordering::Relaxed)
    }
}
