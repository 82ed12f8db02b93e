use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Label emitted for frames carrying the synthetic accident tint.
pub const TINT_MARKER_LABEL: &str = "accident";

const TINT_CONFIDENCE: f32 = 0.92;
const TINT_RED_MIN: f32 = 180.0;
const TINT_OTHER_MAX: f32 = 80.0;

/// Deterministic backend for tests, demos and replay.
///
/// Detections come from three places, in order:
/// 1. Frames listed as failing return an error.
/// 2. A per-frame script keyed by the frame's 1-based index.
/// 3. When tint keying is on, frames dominated by red (as produced by
///    `SyntheticSource` hot ranges) yield one `accident` detection.
#[derive(Default)]
pub struct ScriptedBackend {
    script: HashMap<u64, Vec<Detection>>,
    failing: HashSet<u64>,
    tint_keyed: bool,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that only keys on the synthetic accident tint.
    pub fn tint_keyed() -> Self {
        Self {
            tint_keyed: true,
            ..Self::default()
        }
    }

    /// Script `detections` for the frame at 1-based `index`.
    pub fn with_frame(mut self, index: u64, detections: Vec<Detection>) -> Self {
        self.script.insert(index, detections);
        self
    }

    /// Script the same detection for every frame in `first..=last`.
    pub fn with_range(mut self, first: u64, last: u64, detection: Detection) -> Self {
        for index in first..=last {
            self.script.insert(index, vec![detection.clone()]);
        }
        self
    }

    /// Make `detect` fail for the frame at 1-based `index`.
    pub fn failing_on(mut self, index: u64) -> Self {
        self.failing.insert(index);
        self
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn tint_detection(frame: &Frame) -> Option<Detection> {
        let red = frame.channel_mean(0);
        let green = frame.channel_mean(1);
        let blue = frame.channel_mean(2);
        (red >= TINT_RED_MIN && green <= TINT_OTHER_MAX && blue <= TINT_OTHER_MAX)
            .then(|| Detection::new(TINT_MARKER_LABEL, TINT_CONFIDENCE))
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.calls += 1;
        let index = frame.index();
        if self.failing.contains(&index) {
            return Err(anyhow!("scripted failure on frame {}", index));
        }
        if let Some(detections) = self.script.get(&index) {
            return Ok(DetectionResult::new(detections.clone()));
        }
        if self.tint_keyed {
            if let Some(detection) = Self::tint_detection(frame) {
                return Ok(DetectionResult::new(vec![detection]));
            }
        }
        Ok(DetectionResult::default())
    }
}
