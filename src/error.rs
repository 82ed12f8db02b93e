//! Session error taxonomy.
//!
//! Only `SourceOpen`, `Config` and `Worker` end a session. The other variants are
//! produced at their boundary, logged, and swallowed so a bad frame or a flaky
//! alert channel cannot halt detection.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("cannot open source '{source_ref}': {reason}")]
    SourceOpen { source_ref: String, reason: String },

    #[error("detector failed on frame {frame_index}: {reason}")]
    Detector { frame_index: u64, reason: String },

    #[error("failed to write evidence {}: {reason}", path.display())]
    CaptureWrite { path: PathBuf, reason: String },

    #[error("notification via {channel} failed: {reason}")]
    Notification { channel: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("a session is already running")]
    AlreadyRunning,

    #[error("session worker failed: {0}")]
    Worker(String),
}

impl SentinelError {
    pub fn source_open(source_ref: &str, err: impl std::fmt::Display) -> Self {
        SentinelError::SourceOpen {
            source_ref: source_ref.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn notification(channel: &str, err: impl std::fmt::Display) -> Self {
        SentinelError::Notification {
            channel: channel.to_string(),
            reason: err.to_string(),
        }
    }

    /// True for errors that end the session before or instead of `Running`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SentinelError::SourceOpen { .. }
                | SentinelError::Config(_)
                | SentinelError::Worker(_)
        )
    }
}
