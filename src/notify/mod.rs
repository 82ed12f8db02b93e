//! Alarm and at-most-once alert dispatch.
//!
//! The detection loop talks to a `NotificationDispatcher`: `sound_alarm` on
//! every fired event and `maybe_notify` once per episode. Alerts are handed to
//! a `DispatchWorker` over a bounded queue and delivered on its own thread, so
//! a slow or failing channel never stalls frame processing.

pub mod alarm;
mod dispatcher;
pub mod email;
pub mod message;
pub mod mqtt;
pub mod sms;
#[cfg(feature = "alarm-tone")]
pub mod tone;

use anyhow::Result;

pub use alarm::{AlarmSink, CommandAlarm, MuteSwitch, SilentAlarm, TerminalBell};
pub use dispatcher::{
    DispatchWorker, EpisodeNotice, FailureHook, NotificationDispatcher, NotifyOutcome,
    DEFAULT_QUEUE_CAPACITY,
};
pub use email::{EmailNotifier, EmailSettings};
pub use message::{AlertMessage, Attachment, MAX_ATTACHMENTS};
pub use mqtt::{MqttEndpoint, MqttNotifier, MqttSettings};
pub use sms::{SmsNotifier, SmsSettings};
#[cfg(feature = "alarm-tone")]
pub use tone::ToneAlarm;

/// An alert delivery channel.
pub trait Notifier: Send {
    /// Channel name used in logs and `SentinelError::Notification`.
    fn channel(&self) -> &'static str;

    fn send(&mut self, message: &AlertMessage) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn channel(&self) -> &'static str {
        (**self).channel()
    }

    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        (**self).send(message)
    }
}

/// Writes alerts to the log. Used when no remote channel is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    fn send(&mut self, message: &AlertMessage) -> Result<()> {
        let names: Vec<&str> = message
            .attachments
            .iter()
            .map(|a| a.file_name.as_str())
            .collect();
        log::warn!(
            "{} [source={}] attachments={:?}",
            message.subject,
            message.source_id,
            names
        );
        Ok(())
    }
}
