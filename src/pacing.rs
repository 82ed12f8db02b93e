//! Real-time pacing.
//!
//! Sleeps whatever is left of the source's native frame interval after the
//! frame's processing time. Slow detection never causes extra sleeping; fast
//! detection never runs ahead of the source's presentation rate.

use std::time::{Duration, Instant};

/// Interval used when a source has no reliable native rate.
pub const DEFAULT_FRAME_INTERVAL_MS: f64 = 30.0;

#[derive(Clone, Copy, Debug)]
pub struct PacingController {
    default_interval_ms: f64,
    enabled: bool,
}

impl PacingController {
    pub fn new(default_interval_ms: f64) -> Self {
        Self {
            default_interval_ms,
            enabled: true,
        }
    }

    /// Controller that never sleeps (batch replay, tests).
    pub fn disabled() -> Self {
        Self {
            default_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Interval to pace against: the native one when usable, else the default.
    pub fn effective_interval_ms(&self, native_interval_ms: Option<f64>) -> f64 {
        match native_interval_ms {
            Some(ms) if ms.is_finite() && ms > 0.0 => ms,
            _ => self.default_interval_ms,
        }
    }

    /// `max(0, interval - elapsed)` in milliseconds.
    pub fn delay_for(
        &self,
        processing_started_at: Instant,
        native_frame_interval_ms: Option<f64>,
    ) -> Duration {
        self.delay_after(processing_started_at.elapsed(), native_frame_interval_ms)
    }

    /// Same as `delay_for` with an explicit processing time.
    pub fn delay_after(&self, elapsed: Duration, native_frame_interval_ms: Option<f64>) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let interval_ms = self.effective_interval_ms(native_frame_interval_ms);
        let remaining_ms = interval_ms - elapsed.as_secs_f64() * 1000.0;
        if remaining_ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_micros((remaining_ms * 1000.0).round() as u64)
        }
    }

    /// Sleep for the computed delay. Returns the time slept.
    pub fn pace(
        &self,
        processing_started_at: Instant,
        native_frame_interval_ms: Option<f64>,
    ) -> Duration {
        let delay = self.delay_for(processing_started_at, native_frame_interval_ms);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        delay
    }
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL_MS)
    }
}
