//! Local audible alarm.
//!
//! Alarms are best effort: a failure is logged by the caller and never retried
//! within the same tick. `MuteSwitch` is the session-scoped mute toggle, read
//! right before every play. Turning it on stops every attached alarm that is
//! still sounding.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Something that can make noise.
pub trait AlarmSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start the alarm. Must not block for the duration of the sound.
    fn play(&self) -> Result<()>;

    /// Cut a sound that is still playing.
    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared mute flag. Cloning shares the flag and the attached alarms.
#[derive(Clone, Default)]
pub struct MuteSwitch {
    muted: Arc<AtomicBool>,
    alarms: Arc<Mutex<Vec<Arc<dyn AlarmSink>>>>,
}

impl fmt::Debug for MuteSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuteSwitch")
            .field("muted", &self.is_muted())
            .field("alarms", &self.lock_alarms().len())
            .finish()
    }
}

impl MuteSwitch {
    pub fn new(muted: bool) -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(muted)),
            ..Self::default()
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        if muted {
            self.silence();
        }
    }

    /// Flip the flag and return the new state.
    pub fn toggle(&self) -> bool {
        let muted = !self.muted.fetch_xor(true, Ordering::SeqCst);
        if muted {
            self.silence();
        }
        muted
    }

    /// Register an alarm to be stopped whenever the switch turns on.
    pub fn attach(&self, alarm: Arc<dyn AlarmSink>) {
        self.lock_alarms().push(alarm);
    }

    /// Stop every attached alarm.
    pub fn silence(&self) {
        for alarm in self.lock_alarms().iter() {
            if let Err(e) = alarm.stop() {
                log::warn!("failed to stop {} alarm: {:#}", alarm.name(), e);
            }
        }
    }

    fn lock_alarms(&self) -> MutexGuard<'_, Vec<Arc<dyn AlarmSink>>> {
        self.alarms.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Runs an external player (e.g. `aplay alarm.wav`) without waiting for it.
///
/// Only the latest player is kept: a new `play` ends the previous one, and
/// `stop` kills it. Finished players are reaped on the next call.
pub struct CommandAlarm {
    program: String,
    args: Vec<String>,
    playing: Mutex<Option<Child>>,
}

impl CommandAlarm {
    /// `command[0]` is the program, the rest are its arguments.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("alarm command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            playing: Mutex::new(None),
        })
    }

    /// True while the last started player is still running.
    pub fn is_playing(&self) -> bool {
        match self.lock_playing().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn lock_playing(&self) -> MutexGuard<'_, Option<Child>> {
        self.playing.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn end_player(child: &mut Child) -> Result<()> {
    if child.try_wait()?.is_none() {
        child.kill().context("failed to kill alarm player")?;
        child.wait()?;
    }
    Ok(())
}

impl AlarmSink for CommandAlarm {
    fn name(&self) -> &'static str {
        "command"
    }

    fn play(&self) -> Result<()> {
        let mut playing = self.lock_playing();
        if let Some(mut previous) = playing.take() {
            end_player(&mut previous)?;
        }
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start alarm player '{}'", self.program))?;
        *playing = Some(child);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        match self.lock_playing().take() {
            Some(mut child) => end_player(&mut child),
            None => Ok(()),
        }
    }
}

impl Drop for CommandAlarm {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl AlarmSink for TerminalBell {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn play(&self) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Alarm that does nothing.
pub struct SilentAlarm;

impl AlarmSink for SilentAlarm {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn play(&self) -> Result<()> {
        Ok(())
    }
}
