//! Detection session orchestration.
//!
//! `SessionController` runs one source end to end on a single worker:
//! read, detect, match, debounce, and on a fired event capture, alarm and
//! notify, then publish status and pace. `SessionControl` is the only state
//! shared with callers: a stop flag, the alarm mute switch, and the latest
//! `StatusSnapshot`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::capture::{CaptureManager, CaptureOutcome, CaptureSettings};
use crate::debounce::{EventDebouncer, DEFAULT_CONSECUTIVE_FRAMES};
use crate::detect::{DetectorBackend, TargetMatcher};
use crate::episode::{EventEpisode, DEFAULT_CAPTURE_LIMIT};
use crate::error::SentinelError;
use crate::ingest::{open_source, FrameSource, SourceOptions};
use crate::notify::{MuteSwitch, NotificationDispatcher, NotifyOutcome};
use crate::pacing::PacingController;

/// Label shown while no event has been seen.
pub const IDLE_EVENT_LABEL: &str = "No Accident Reported";

/// Coarse session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Error,
}

/// Immutable view of a session, published after every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub last_event_label: String,
    pub frames_processed: u64,
    pub total_frames: Option<u64>,
    pub progress_pct: Option<f32>,
    pub captures: u32,
    pub notified: bool,
    pub error: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            last_event_label: IDLE_EVENT_LABEL.to_string(),
            frames_processed: 0,
            total_frames: None,
            progress_pct: None,
            captures: 0,
            notified: false,
            error: None,
        }
    }
}

/// Percent of `total` covered by `processed`, when the total is known.
pub fn progress_pct(processed: u64, total: Option<u64>) -> Option<f32> {
    match total {
        Some(total) if total > 0 => {
            Some((processed as f64 / total as f64 * 100.0).min(100.0) as f32)
        }
        _ => None,
    }
}

/// Handles shared between a session worker and its callers. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct SessionControl {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    mute: MuteSwitch,
    status: Arc<Mutex<StatusSnapshot>>,
}

impl SessionControl {
    pub fn new(muted: bool) -> Self {
        Self {
            mute: MuteSwitch::new(muted),
            ..Self::default()
        }
    }

    /// Ask the running session to stop after its current frame.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the alarm mute. Returns the new state.
    pub fn toggle_mute(&self) -> bool {
        self.mute.toggle()
    }

    pub fn set_muted(&self, muted: bool) {
        self.mute.set(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.is_muted()
    }

    /// Switch to hand to the session's `NotificationDispatcher`.
    pub fn mute_switch(&self) -> MuteSwitch {
        self.mute.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock_status().clone()
    }

    /// Claim the control for a new session and clear any old stop request.
    fn begin(&self) -> Result<(), SentinelError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SentinelError::AlreadyRunning);
        }
        self.stop.store(false, Ordering::SeqCst);
        *self.lock_status() = StatusSnapshot::default();
        Ok(())
    }

    fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        update(&mut *self.lock_status());
    }

    /// Back to the idle representation, keeping the final frame count.
    fn finish_idle(&self) {
        self.publish(|s| {
            s.status = SessionStatus::Idle;
            s.last_event_label = IDLE_EVENT_LABEL.to_string();
            s.progress_pct = None;
            s.error = None;
        });
        self.running.store(false, Ordering::SeqCst);
    }

    fn finish_error(&self, err: &SentinelError) {
        self.publish(|s| {
            s.status = SessionStatus::Error;
            s.progress_pct = None;
            s.error = Some(err.to_string());
        });
        self.running.store(false, Ordering::SeqCst);
    }

    // Readers never panic the worker: a poisoned status is still usable.
    fn lock_status(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Per-run settings.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub source_ref: String,
    pub source_options: SourceOptions,
    pub output_root: PathBuf,
    pub matcher: TargetMatcher,
    pub consecutive_frames: u32,
    pub capture_limit: u32,
    pub capture: CaptureSettings,
    pub pacing: PacingController,
}

impl SessionSettings {
    pub fn new(source_ref: &str, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_ref: source_ref.to_string(),
            source_options: SourceOptions::default(),
            output_root: output_root.into(),
            matcher: TargetMatcher::new("accident", 0.5),
            consecutive_frames: DEFAULT_CONSECUTIVE_FRAMES,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            capture: CaptureSettings::default(),
            pacing: PacingController::default(),
        }
    }
}

/// What a finished session did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub source_id: String,
    pub frames_processed: u64,
    pub events_fired: u64,
    pub captures: u32,
    pub notified: bool,
    pub cancelled: bool,
    pub evidence_dir: PathBuf,
}

/// Runs one detection session.
pub struct SessionController {
    settings: SessionSettings,
    detector: Box<dyn DetectorBackend>,
    dispatcher: NotificationDispatcher,
    control: SessionControl,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        detector: Box<dyn DetectorBackend>,
        dispatcher: NotificationDispatcher,
        control: SessionControl,
    ) -> Self {
        Self {
            settings,
            detector,
            dispatcher,
            control,
        }
    }

    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    /// Run to exhaustion or cancellation on the calling thread.
    pub fn run(&mut self) -> Result<SessionSummary, SentinelError> {
        self.control.begin()?;
        self.run_claimed()
    }

    fn run_claimed(&mut self) -> Result<SessionSummary, SentinelError> {
        let source = match open_source(&self.settings.source_ref, &self.settings.source_options) {
            Ok(source) => source,
            Err(e) => {
                log::error!("{}", e);
                self.control.finish_error(&e);
                return Err(e);
            }
        };
        if let Err(e) = self.detector.warm_up() {
            log::warn!("detector '{}' warm-up failed: {:#}", self.detector.name(), e);
        }
        let summary = self.process(source);
        self.control.finish_idle();
        log::info!(
            "session {} finished: {} frames, {} events, {} captures, notified={}, cancelled={}",
            summary.source_id,
            summary.frames_processed,
            summary.events_fired,
            summary.captures,
            summary.notified,
            summary.cancelled
        );
        Ok(summary)
    }

    fn process(&mut self, mut source: Box<dyn FrameSource>) -> SessionSummary {
        let settings = &self.settings;
        let source_id = source.source_id().to_string();
        let total_frames = source.total_frames();
        let native_interval_ms = source.native_interval_ms();

        let mut episode =
            EventEpisode::new(&settings.output_root, &source_id, settings.capture_limit);
        let mut capture = CaptureManager::new(&episode, settings.capture.clone());
        let mut debouncer = EventDebouncer::new(settings.consecutive_frames);
        let mut frames_processed = 0u64;
        let mut events_fired = 0u64;
        let mut cancelled = false;

        self.control.publish(|s| {
            s.status = SessionStatus::Running;
            s.total_frames = total_frames;
            s.progress_pct = progress_pct(0, total_frames);
        });
        log::info!(
            "session running: source={} id={} detector={} total={:?}",
            settings.source_ref,
            source_id,
            self.detector.name(),
            total_frames
        );

        loop {
            if self.control.stop_requested() {
                log::info!("session {} cancelled after {} frames", source_id, frames_processed);
                cancelled = true;
                break;
            }
            let started = Instant::now();
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("source {} read failed, ending session: {:#}", source_id, e);
                    break;
                }
            };

            let matched = match self.detector.detect(&frame) {
                Ok(result) => result
                    .first_match(&settings.matcher)
                    .map(|detection| detection.label.clone()),
                Err(e) => {
                    let err = SentinelError::Detector {
                        frame_index: frame.index(),
                        reason: format!("{:#}", e),
                    };
                    log::warn!("{}", err);
                    None
                }
            };

            let mut fired_label = None;
            if debouncer.update(matched.is_some()) {
                events_fired += 1;
                fired_label = matched;
                log::info!("event fired on frame {} of {}", frame.index(), source_id);
                match capture.on_event(&mut episode, &frame, true) {
                    Ok(CaptureOutcome::Captured(_)) => {}
                    Ok(CaptureOutcome::Skipped) => log::debug!("capture limit reached"),
                    Err(e) => log::warn!("{}", e),
                }
                self.dispatcher.sound_alarm();
                if self.dispatcher.maybe_notify(&mut episode) == NotifyOutcome::Queued {
                    log::info!("alert queued for {}", source_id);
                }
            }

            frames_processed += 1;
            self.control.publish(|s| {
                if let Some(label) = fired_label {
                    s.last_event_label = label;
                }
                s.frames_processed = frames_processed;
                s.progress_pct = progress_pct(frames_processed, total_frames);
                s.captures = episode.captured_count();
                s.notified = episode.notified();
            });

            settings.pacing.pace(started, native_interval_ms);
        }

        let stats = source.stats();
        drop(source);
        log::debug!("released source {} after {} frames", stats.source, stats.frames_read);

        SessionSummary {
            source_id,
            frames_processed,
            events_fired,
            captures: episode.captured_count(),
            notified: episode.notified(),
            cancelled,
            evidence_dir: episode.evidence_dir(),
        }
    }
}

/// Publishes the error status when the session thread unwinds, so pollers
/// see the failure without joining.
struct PanicGuard(SessionControl);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let err = SentinelError::Worker("session thread panicked".to_string());
            log::error!("{}", err);
            self.0.finish_error(&err);
        }
    }
}

/// A session running on its own thread.
pub struct SessionHandle {
    control: SessionControl,
    handle: JoinHandle<Result<SessionSummary, SentinelError>>,
}

impl SessionHandle {
    /// Start `controller` on a named worker thread.
    ///
    /// Fails with `AlreadyRunning` when its control already drives a session.
    pub fn start(mut controller: SessionController) -> Result<Self, SentinelError> {
        let control = controller.control.clone();
        control.begin()?;
        let spawned = std::thread::Builder::new()
            .name("crash-sentinel-session".to_string())
            .spawn(move || {
                let _guard = PanicGuard(controller.control.clone());
                controller.run_claimed()
            });
        match spawned {
            Ok(handle) => Ok(Self { control, handle }),
            Err(e) => {
                let err = SentinelError::Worker(e.to_string());
                control.finish_error(&err);
                Err(err)
            }
        }
    }

    pub fn control(&self) -> &SessionControl {
        &self.control
    }

    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session and return its summary.
    pub fn join(self) -> Result<SessionSummary, SentinelError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                let err = SentinelError::Worker("session thread panicked".to_string());
                self.control.finish_error(&err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectionResult, ScriptedBackend};
    use crate::frame::Frame;
    use crate::notify::{DispatchWorker, SilentAlarm};

    fn controller(
        source_ref: &str,
        root: &std::path::Path,
        detector: ScriptedBackend,
        worker: &DispatchWorker,
        control: SessionControl,
    ) -> SessionController {
        let mut settings = SessionSettings::new(source_ref, root);
        settings.pacing = PacingController::disabled();
        let dispatcher = worker.dispatcher(Arc::new(SilentAlarm), control.mute_switch());
        SessionController::new(settings, Box::new(detector), dispatcher, control)
    }

    #[test]
    fn progress_is_unknown_without_total() {
        assert_eq!(progress_pct(5, None), None);
        assert_eq!(progress_pct(5, Some(0)), None);
        assert_eq!(progress_pct(5, Some(10)), Some(50.0));
        assert_eq!(progress_pct(12, Some(10)), Some(100.0));
    }

    /// Records the published label each time a frame reaches the detector.
    struct LabelSpy {
        inner: ScriptedBackend,
        control: SessionControl,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl DetectorBackend for LabelSpy {
        fn name(&self) -> &'static str {
            "label-spy"
        }

        fn detect(&mut self, frame: &Frame) -> anyhow::Result<DetectionResult> {
            self.seen
                .lock()
                .unwrap()
                .push(self.control.snapshot().last_event_label);
            self.inner.detect(frame)
        }
    }

    struct Exploding;

    impl DetectorBackend for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<DetectionResult> {
            panic!("detector blew up");
        }
    }

    #[test]
    fn label_changes_only_when_an_event_fires() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        // Frame 2 is a lone hit; frames 4-5 complete a streak of two.
        let inner = ScriptedBackend::new()
            .with_frame(2, vec![Detection::new("Car Accident", 0.9)])
            .with_range(4, 5, Detection::new("Car Accident", 0.9));
        let spy = LabelSpy {
            inner,
            control: control.clone(),
            seen: seen.clone(),
        };
        let mut settings = SessionSettings::new("stub://clip?frames=6", root.path());
        settings.pacing = PacingController::disabled();
        settings.consecutive_frames = 2;
        let dispatcher = worker.dispatcher(Arc::new(SilentAlarm), control.mute_switch());
        let mut session =
            SessionController::new(settings, Box::new(spy), dispatcher, control.clone());

        let summary = session.run().unwrap();
        assert_eq!(summary.events_fired, 1);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 6);
        assert!(seen[..5].iter().all(|label| label == IDLE_EVENT_LABEL));
        assert_eq!(seen[5], "Car Accident");
    }

    #[test]
    fn panicked_session_is_visible_without_join() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let mut settings = SessionSettings::new("stub://clip?frames=3", root.path());
        settings.pacing = PacingController::disabled();
        let dispatcher = worker.dispatcher(Arc::new(SilentAlarm), control.mute_switch());
        let session =
            SessionController::new(settings, Box::new(Exploding), dispatcher, control.clone());

        let handle = SessionHandle::start(session).unwrap();
        while !handle.is_finished() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(!control.is_running());
        let snapshot = control.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("session worker failed: session thread panicked")
        );
        assert!(matches!(handle.join(), Err(SentinelError::Worker(_))));
    }

    #[test]
    fn label_resets_when_the_session_goes_idle() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let detector =
            ScriptedBackend::new().with_frame(2, vec![Detection::new("Car Accident", 0.9)]);
        let mut session = controller(
            "stub://clip?frames=4",
            root.path(),
            detector,
            &worker,
            control.clone(),
        );

        let summary = session.run().unwrap();
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.events_fired, 0);

        let snapshot = control.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.last_event_label, IDLE_EVENT_LABEL);
        assert_eq!(snapshot.frames_processed, 4);
        assert_eq!(snapshot.progress_pct, None);
        assert!(!control.is_running());
    }

    #[test]
    fn detector_errors_break_the_streak() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let detector = ScriptedBackend::new()
            .with_range(1, 6, Detection::new("accident", 0.9))
            .failing_on(3);
        let mut session = controller(
            "stub://clip?frames=6",
            root.path(),
            detector,
            &worker,
            SessionControl::default(),
        );

        let summary = session.run().unwrap();
        // Frames 1-2 qualify, 3 fails, 4-6 complete one streak.
        assert_eq!(summary.events_fired, 1);
        assert_eq!(summary.captures, 1);
    }

    #[test]
    fn stop_before_first_frame_processes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let mut session = controller(
            "stub://endless",
            root.path(),
            ScriptedBackend::tint_keyed(),
            &worker,
            control.clone(),
        );
        control.begin().unwrap();
        control.request_stop();

        let summary = session.run_claimed().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames_processed, 0);
        assert!(!root.path().join("endless").exists());
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let mut settings = SessionSettings::new("stub://endless", root.path());
        settings.pacing = PacingController::new(5.0);
        let first = SessionController::new(
            settings.clone(),
            Box::new(ScriptedBackend::new()),
            worker.dispatcher(Arc::new(SilentAlarm), control.mute_switch()),
            control.clone(),
        );
        let second = SessionController::new(
            settings,
            Box::new(ScriptedBackend::new()),
            worker.dispatcher(Arc::new(SilentAlarm), control.mute_switch()),
            control.clone(),
        );

        let handle = SessionHandle::start(first).unwrap();
        assert!(matches!(
            SessionHandle::start(second),
            Err(SentinelError::AlreadyRunning)
        ));
        handle.stop();
        let summary = handle.join().unwrap();
        assert!(summary.cancelled);
        assert!(!control.is_running());
    }

    #[test]
    fn open_failure_reports_error_status() {
        let root = tempfile::tempdir().unwrap();
        let worker = DispatchWorker::spawn(Vec::new(), 4, 5, None).unwrap();
        let control = SessionControl::default();
        let mut session = controller(
            "/no/such/clip.mp4",
            root.path(),
            ScriptedBackend::new(),
            &worker,
            control.clone(),
        );

        let err = session.run().unwrap_err();
        assert!(matches!(err, SentinelError::SourceOpen { .. }));
        let snapshot = control.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.frames_processed, 0);
        assert!(snapshot.error.is_some());
        assert!(!control.is_running());
    }
}
