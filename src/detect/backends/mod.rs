pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::{ScriptedBackend, TINT_MARKER_LABEL};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
