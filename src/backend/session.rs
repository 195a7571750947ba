use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::RelayResult;
use crate::storage::ensure_parent_dir;

/// Bearer token plus the identity it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Persisted login state, read once at startup and cleared on forced logout.
pub struct SessionStore {
    path: Option<PathBuf>,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let current = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Session>(&content) {
                Ok(session) => Some(session),
                Err(err) => {
                    log::warn!("Ignoring unreadable session file {}: {err}", path.display());
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Failed to read session file {}: {err}", path.display());
                None
            }
        };

        Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(current),
        }
    }

    /// Session that lives only as long as the process.
    pub fn ephemeral(session: Option<Session>) -> Self {
        Self {
            path: None,
            current: RwLock::new(session),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|session| session.token.clone())
    }

    pub fn save(&self, session: Session) -> RelayResult<()> {
        if let Some(path) = &self.path {
            ensure_parent_dir(path)?;
            fs::write(path, serde_json::to_string_pretty(&session)?)?;
        }
        *self.current.write() = Some(session);
        Ok(())
    }

    pub fn clear(&self) {
        *self.current.write() = None;
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => log::info!("Session cleared ({})", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log::error!("Failed to remove session file {}: {err}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn saved_session_survives_reload_until_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/session.json");

        let store = SessionStore::load(&path);
        assert!(store.current().is_none());

        store
            .save(Session {
                token: "abc".to_string(),
                user_id: Some("u1".to_string()),
                user_name: None,
            })
            .unwrap();
        assert_eq!(SessionStore::load(&path).token().as_deref(), Some("abc"));

        store.clear();
        assert!(store.token().is_none());
        assert!(!path.exists());
    }
}
