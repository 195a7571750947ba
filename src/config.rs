use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/relay.json";
/// Overrides `api_base_url` when set.
pub const API_URL_ENV: &str = "RELAY_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub database_path: String,
    pub session_path: String,
    pub conference_base_url: String,
    pub poll_interval_secs: u64,
    pub accept_grace_secs: u64,
    pub reject_grace_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            database_path: "data/relay.db".to_string(),
            session_path: "data/session.json".to_string(),
            conference_base_url: "https://meet.jit.si".to_string(),
            poll_interval_secs: 30,
            accept_grace_secs: 10,
            reject_grace_secs: 2,
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn accept_grace(&self) -> Duration {
        Duration::from_secs(self.accept_grace_secs)
    }

    pub fn reject_grace(&self) -> Duration {
        Duration::from_secs(self.reject_grace_secs)
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let mut config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
        if !url.trim().is_empty() {
            log::debug!("{API_URL_ENV} overrides api_base_url");
            config.api_base_url = url;
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, r#"{ "poll_interval_secs": 5, "reject_grace_secs": 1 }"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.reject_grace(), Duration::from_secs(1));
        assert_eq!(config.accept_grace(), Duration::from_secs(10));
        assert_eq!(config.database_path, "data/relay.db");
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.poll_interval_secs, 30);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = AppConfig {
            poll_interval_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }
}
