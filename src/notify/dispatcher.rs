//! Episode notification handoff.
//!
//! `NotificationDispatcher` lives inside one session. It claims the episode's
//! `notified` flag synchronously and then hands an `EpisodeNotice` to the
//! `DispatchWorker` with `try_send`. The worker owns every `Notifier` and
//! delivers on its own thread. A full or closed queue drops the notice with an
//! error log: the flag has already flipped, so no second attempt is made.

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::alarm::{AlarmSink, MuteSwitch};
use super::message::AlertMessage;
use super::Notifier;
use crate::episode::EventEpisode;
use crate::error::SentinelError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Called on the worker thread for every failed delivery.
pub type FailureHook = Arc<dyn Fn(&SentinelError) + Send + Sync>;

/// "Notify about episode X" handoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeNotice {
    pub source_id: String,
    pub evidence_dir: PathBuf,
}

/// What `maybe_notify` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The episode's first notice was handed to the worker.
    Queued,
    /// The episode was already notified; nothing happened.
    AlreadyNotified,
    /// The flag was claimed but the queue was full or closed.
    Dropped,
}

/// Background delivery thread shared by all sessions of a process.
pub struct DispatchWorker {
    queue: Option<SyncSender<EpisodeNotice>>,
    handle: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn spawn(
        notifiers: Vec<Box<dyn Notifier>>,
        capacity: usize,
        max_attachments: usize,
        on_failure: Option<FailureHook>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = sync_channel(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("crash-sentinel-notify".to_string())
            .spawn(move || deliver_loop(rx, notifiers, max_attachments, on_failure))?;
        Ok(Self {
            queue: Some(tx),
            handle: Some(handle),
        })
    }

    /// Build a session-side dispatcher feeding this worker.
    ///
    /// `alarm` is attached to `mute`, so muting cuts a sound already playing.
    pub fn dispatcher(&self, alarm: Arc<dyn AlarmSink>, mute: MuteSwitch) -> NotificationDispatcher {
        mute.attach(Arc::clone(&alarm));
        NotificationDispatcher {
            queue: self.queue.clone(),
            alarm,
            mute,
        }
    }

    /// Close the queue, deliver what is pending, and join the worker.
    ///
    /// Blocks until every `NotificationDispatcher` built from this worker has
    /// been dropped.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.queue.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("notification worker panicked");
            }
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver_loop(
    rx: Receiver<EpisodeNotice>,
    mut notifiers: Vec<Box<dyn Notifier>>,
    max_attachments: usize,
    on_failure: Option<FailureHook>,
) {
    for notice in rx {
        let message = match AlertMessage::with_evidence(
            &notice.source_id,
            &notice.evidence_dir,
            max_attachments,
        ) {
            Ok(message) => message,
            Err(e) => {
                log::warn!(
                    "alert for {} sent without evidence: {:#}",
                    notice.source_id,
                    e
                );
                AlertMessage::new(&notice.source_id)
            }
        };
        for notifier in notifiers.iter_mut() {
            match notifier.send(&message) {
                Ok(()) => log::info!(
                    "alert for {} delivered via {} ({} attachments)",
                    notice.source_id,
                    notifier.channel(),
                    message.attachments.len()
                ),
                Err(e) => {
                    let err = SentinelError::notification(notifier.channel(), format!("{:#}", e));
                    log::error!("{}", err);
                    if let Some(hook) = &on_failure {
                        hook(&err);
                    }
                }
            }
        }
    }
    log::debug!("notification worker stopped");
}

/// Session-side alarm and notification front end.
pub struct NotificationDispatcher {
    queue: Option<SyncSender<EpisodeNotice>>,
    alarm: Arc<dyn AlarmSink>,
    mute: MuteSwitch,
}

impl NotificationDispatcher {
    /// Play the alarm unless muted. Returns whether it was started.
    pub fn sound_alarm(&self) -> bool {
        if self.mute.is_muted() {
            log::debug!("alarm muted");
            return false;
        }
        match self.alarm.play() {
            // Muted while starting: the switch may have missed this sound.
            Ok(()) if self.mute.is_muted() => {
                let _ = self.alarm.stop();
                false
            }
            Ok(()) => true,
            Err(e) => {
                log::warn!("alarm '{}' failed: {:#}", self.alarm.name(), e);
                false
            }
        }
    }

    /// Queue the episode's single alert, claiming `notified` first.
    pub fn maybe_notify(&self, episode: &mut EventEpisode) -> NotifyOutcome {
        if !episode.claim_notification() {
            return NotifyOutcome::AlreadyNotified;
        }
        let notice = EpisodeNotice {
            source_id: episode.source_id().to_string(),
            evidence_dir: episode.evidence_dir(),
        };
        let Some(queue) = &self.queue else {
            log::error!("alert for {} dropped: dispatcher closed", notice.source_id);
            return NotifyOutcome::Dropped;
        };
        match queue.try_send(notice) {
            Ok(()) => NotifyOutcome::Queued,
            Err(TrySendError::Full(notice)) => {
                log::error!("alert for {} dropped: queue full", notice.source_id);
                NotifyOutcome::Dropped
            }
            Err(TrySendError::Disconnected(notice)) => {
                log::error!("alert for {} dropped: worker gone", notice.source_id);
                NotifyOutcome::Dropped
            }
        }
    }

    pub fn mute(&self) -> &MuteSwitch {
        &self.mute
    }
}
