/// One labeled detection produced by a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class label as named by the model (e.g. "Accident", "car_crash").
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Result of running detection on a frame. Never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Detections in backend order.
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// First detection satisfying `matcher`, in backend order.
    pub fn first_match(&self, matcher: &TargetMatcher) -> Option<&Detection> {
        self.detections.iter().find(|d| matcher.matches(d))
    }
}

/// Qualifying-detection predicate.
///
/// A detection qualifies when its label contains the target (case-insensitive)
/// and its confidence is strictly above the threshold.
#[derive(Clone, Debug)]
pub struct TargetMatcher {
    target: String,
    threshold: f32,
}

impl TargetMatcher {
    pub fn new(target: &str, threshold: f32) -> Self {
        Self {
            target: target.to_lowercase(),
            threshold,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn matches(&self, detection: &Detection) -> bool {
        detection.confidence > self.threshold
            && detection.label.to_lowercase().contains(&self.target)
    }
}
