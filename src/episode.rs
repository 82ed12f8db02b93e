//! Per-session capture and notification state.

use std::path::{Path, PathBuf};

/// Default evidence ceiling per session.
pub const DEFAULT_CAPTURE_LIMIT: u32 = 5;

/// Cumulative state of one detection session.
///
/// Invariants: `captured_count <= capture_limit`, and `notified` moves from
/// false to true at most once. Only `CaptureManager` and
/// `NotificationDispatcher` mutate it.
#[derive(Clone, Debug)]
pub struct EventEpisode {
    captured_count: u32,
    capture_limit: u32,
    notified: bool,
    output_root: PathBuf,
    source_id: String,
}

impl EventEpisode {
    pub fn new(output_root: impl Into<PathBuf>, source_id: &str, capture_limit: u32) -> Self {
        Self {
            captured_count: 0,
            capture_limit,
            notified: false,
            output_root: output_root.into(),
            source_id: source_id.to_string(),
        }
    }

    pub fn captured_count(&self) -> u32 {
        self.captured_count
    }

    pub fn capture_limit(&self) -> u32 {
        self.capture_limit
    }

    pub fn is_full(&self) -> bool {
        self.captured_count >= self.capture_limit
    }

    pub fn notified(&self) -> bool {
        self.notified
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// `<output_root>/<source_id>`.
    pub fn evidence_dir(&self) -> PathBuf {
        self.output_root.join(&self.source_id)
    }

    /// Sequence number the next capture would use (1-based).
    pub(crate) fn next_sequence(&self) -> u32 {
        self.captured_count + 1
    }

    pub(crate) fn record_capture(&mut self) {
        debug_assert!(self.captured_count < self.capture_limit);
        self.captured_count += 1;
    }

    /// Flip `notified`. Returns true only for the call that flipped it.
    pub(crate) fn claim_notification(&mut self) -> bool {
        if self.notified {
            return false;
        }
        self.notified = true;
        true
    }
}
