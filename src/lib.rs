//! Crash Sentinel
//!
//! Turns per-frame accident classifications into debounced events and drives
//! their side effects: evidence snapshots, a local alarm, and one remote alert
//! per session.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (video files and streams, image directories, `stub://`)
//! - `detect`: Detector backends and the qualifying-label matcher
//! - `debounce`: Consecutive-frame event debouncer
//! - `capture`, `overlay`: Evidence snapshots and their annotation
//! - `notify`: Alarm sinks, alert channels and the dispatch worker
//! - `pacing`: Real-time frame pacing
//! - `session`: Session controller, shared control handle and status snapshots
//! - `config`: File and environment configuration

pub mod capture;
pub mod config;
pub mod debounce;
pub mod detect;
pub mod episode;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod overlay;
pub mod pacing;
pub mod session;
pub mod ui;

pub use capture::{CaptureManager, CaptureOutcome, CaptureSettings};
pub use config::{ConfigOverrides, SentinelConfig};
pub use debounce::{EventDebouncer, StreakState};
pub use detect::{BackendRegistry, Detection, DetectionResult, DetectorBackend, TargetMatcher};
pub use episode::EventEpisode;
pub use error::SentinelError;
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceOptions};
pub use notify::{AlarmSink, DispatchWorker, NotificationDispatcher, Notifier, NotifyOutcome};
pub use pacing::PacingController;
pub use session::{
    SessionControl, SessionController, SessionHandle, SessionSettings, SessionStatus,
    SessionSummary, StatusSnapshot,
};
