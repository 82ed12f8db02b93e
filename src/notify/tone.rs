//! Synthesized alarm tone on the default audio output.
//!
//! `cpal::Stream` is not `Send`, so streams live on a dedicated thread that
//! takes play/stop commands. A tone beeps for `duration` unless stopped or
//! restarted.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::f32::consts::PI;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::alarm::AlarmSink;

pub const DEFAULT_TONE_HZ: f32 = 880.0;
pub const DEFAULT_TONE_DURATION: Duration = Duration::from_secs(3);

/// Beep on for one half period, silent for the other.
const BEEP_HALF_PERIOD_S: f32 = 0.25;
const AMPLITUDE: f32 = 0.25;

enum ToneCommand {
    Play,
    Stop,
}

pub struct ToneAlarm {
    commands: Mutex<Option<Sender<ToneCommand>>>,
    worker: Option<JoinHandle<()>>,
}

impl ToneAlarm {
    /// Checks the output device up front so a missing device fails at startup.
    pub fn new(frequency_hz: f32, duration: Duration) -> Result<Self> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(anyhow!("tone frequency must be positive"));
        }
        output_device()?;
        let (tx, rx) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("crash-sentinel-tone".to_string())
            .spawn(move || tone_loop(rx, frequency_hz, duration))
            .context("failed to start tone thread")?;
        Ok(Self {
            commands: Mutex::new(Some(tx)),
            worker: Some(worker),
        })
    }

    fn send(&self, command: ToneCommand) -> Result<()> {
        let commands = self.commands.lock().unwrap_or_else(|p| p.into_inner());
        commands
            .as_ref()
            .ok_or_else(|| anyhow!("tone thread closed"))?
            .send(command)
            .map_err(|_| anyhow!("tone thread exited"))
    }
}

impl AlarmSink for ToneAlarm {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn play(&self) -> Result<()> {
        self.send(ToneCommand::Play)
    }

    fn stop(&self) -> Result<()> {
        self.send(ToneCommand::Stop)
    }
}

impl Drop for ToneAlarm {
    fn drop(&mut self) {
        self.commands
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn tone_loop(commands: Receiver<ToneCommand>, frequency_hz: f32, duration: Duration) {
    let mut playing: Option<(cpal::Stream, Instant)> = None;
    loop {
        let command = match &playing {
            Some((_, until)) => {
                match commands.recv_timeout(until.saturating_duration_since(Instant::now())) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        playing = None;
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };
        match command {
            ToneCommand::Play => {
                // Drop the old stream first so two tones never overlap.
                playing = None;
                match open_tone(frequency_hz) {
                    Ok(stream) => playing = Some((stream, Instant::now() + duration)),
                    Err(e) => log::warn!("alarm tone failed: {:#}", e),
                }
            }
            ToneCommand::Stop => playing = None,
        }
    }
}

fn output_device() -> Result<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow!("no audio output device"))
}

fn open_tone(frequency_hz: f32) -> Result<cpal::Stream> {
    let device = output_device()?;
    let supported = device
        .default_output_config()
        .context("failed to query output config")?;
    if supported.sample_format() != SampleFormat::F32 {
        return Err(anyhow!(
            "unsupported output sample format {:?}",
            supported.sample_format()
        ));
    }
    let channels = usize::from(supported.channels()).max(1);
    let sample_rate = supported.sample_rate().0 as f32;
    let mut clock = 0u64;
    let stream = device
        .build_output_stream(
            &supported.config(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = tone_sample(clock as f32 / sample_rate, frequency_hz);
                    clock += 1;
                    frame.iter_mut().for_each(|sample| *sample = value);
                }
            },
            |err| log::warn!("alarm tone stream error: {}", err),
            None,
        )
        .context("failed to build output stream")?;
    stream.play().context("failed to start output stream")?;
    Ok(stream)
}

/// Beeping sine wave at `t` seconds.
fn tone_sample(t: f32, frequency_hz: f32) -> f32 {
    if (t / BEEP_HALF_PERIOD_S) as u64 % 2 == 1 {
        return 0.0;
    }
    AMPLITUDE * (2.0 * PI * frequency_hz * t).sin()
}
