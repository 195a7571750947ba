//! Support relay for the Sleepwell sleep and stress tracker: user/expert chat
//! threads, video-call signaling and the unread-message badge.

pub mod backend;
pub mod common;
pub mod config;
pub mod console;
pub mod error;
pub mod relay;
pub mod storage;

pub use error::{RelayError, RelayResult};
