mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, TINT_MARKER_LABEL};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{Detection, DetectionResult, TargetMatcher};
