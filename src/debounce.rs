//! Consecutive-frame debouncing.
//!
//! Turns a noisy per-frame "qualifying detection" boolean into event ticks. A
//! tick fires on the frame that completes `threshold` consecutive qualifying
//! frames; the streak then restarts from zero, so a long incident re-fires
//! every `threshold` frames. One non-qualifying frame discards all progress.

/// Default number of consecutive qualifying frames per event tick.
pub const DEFAULT_CONSECUTIVE_FRAMES: u32 = 3;

/// Streak bookkeeping for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreakState {
    pub count: u32,
    pub threshold: u32,
}

/// Debouncer for one session. Single writer; no interior locking.
#[derive(Clone, Debug)]
pub struct EventDebouncer {
    streak: StreakState,
}

impl EventDebouncer {
    /// `threshold` of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            streak: StreakState {
                count: 0,
                threshold: threshold.max(1),
            },
        }
    }

    /// Feed one frame's predicate. Returns true when this frame fires an event.
    pub fn update(&mut self, frame_has_qualifying_detection: bool) -> bool {
        if !frame_has_qualifying_detection {
            self.streak.count = 0;
            return false;
        }
        self.streak.count += 1;
        if self.streak.count >= self.streak.threshold {
            self.streak.count = 0;
            return true;
        }
        false
    }

    pub fn streak(&self) -> StreakState {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak.count = 0;
    }
}

impl Default for EventDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSECUTIVE_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fired_at(threshold: u32, inputs: &[bool]) -> Vec<usize> {
        let mut debouncer = EventDebouncer::new(threshold);
        inputs
            .iter()
            .enumerate()
            .filter_map(|(i, &q)| debouncer.update(q).then_some(i))
            .collect()
    }

    #[test]
    fn fires_once_on_completed_streak() {
        let (t, f) = (true, false);
        assert_eq!(fired_at(3, &[f, t, t, t, t, t, f]), vec![3]);
    }

    #[test]
    fn sustained_condition_refires_every_threshold_frames() {
        assert_eq!(fired_at(3, &[true; 9]), vec![2, 5, 8]);
    }

    #[test]
    fn single_miss_discards_progress() {
        let (t, f) = (true, false);
        assert_eq!(fired_at(3, &[t, t, f, t, t, f, t, t, t]), vec![8]);
    }

    #[test]
    fn streak_resets_after_fire() {
        let mut debouncer = EventDebouncer::new(2);
        assert!(!debouncer.update(true));
        assert_eq!(debouncer.streak().count, 1);
        assert!(debouncer.update(true));
        assert_eq!(debouncer.streak().count, 0);
    }

    #[test]
    fn threshold_of_one_fires_on_every_qualifying_frame() {
        assert_eq!(fired_at(1, &[true, false, true, true]), vec![0, 2, 3]);
        assert_eq!(EventDebouncer::new(0).streak().threshold, 1);
    }

    #[test]
    fn fires_iff_window_qualifies_and_no_earlier_fire_in_window() {
        // Exhaustive check over all 10-frame inputs for threshold 3.
        let threshold = 3usize;
        for bits in 0u32..(1 << 10) {
            let inputs: Vec<bool> = (0..10).map(|i| bits & (1 << i) != 0).collect();
            let fired = fired_at(threshold as u32, &inputs);
            let mut expected = Vec::new();
            for k in 0..inputs.len() {
                if k + 1 < threshold {
                    continue;
                }
                let window = k + 1 - threshold..=k;
                let all_true = window.clone().all(|i| inputs[i]);
                let fired_inside = expected.iter().any(|&e| window.contains(&e));
                if all_true && !fired_inside {
                    expected.push(k);
                }
            }
            assert_eq!(fired, expected, "inputs {:?}", inputs);
        }
    }
}
