use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Detector backend trait.
///
/// The session only relies on `detect`: one frame in, zero or more labeled
/// detections out. Backends may block on compute; the session does not impose
/// a timeout. Errors are per-frame and never end a session.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the frame as read-only and must not keep it
    /// past the call.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
