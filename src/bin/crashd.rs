//! crashd - run one accident-detection session against a video, stream,
//! image directory or `stub://` source.
//!
//! On a terminal, typing `m` + Enter toggles the alarm mute and `q` + Enter
//! stops the session.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use crash_sentinel::config::{split_csv, ConfigOverrides};
use crash_sentinel::detect::ScriptedBackend;
use crash_sentinel::ingest::list_videos;
use crash_sentinel::notify::FailureHook;
use crash_sentinel::pacing::PacingController;
use crash_sentinel::ui::{ProgressView, UiMode};
use crash_sentinel::{
    BackendRegistry, DispatchWorker, SentinelConfig, SentinelError, SessionControl,
    SessionController, SessionHandle,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, rtsp/http stream, image directory or stub:// reference.
    #[arg(long, env = "CRASH_SENTINEL_SOURCE", required_unless_present = "list")]
    source: Option<String>,
    /// Evidence output root (overrides config).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Confidence threshold a detection must exceed.
    #[arg(long)]
    confidence: Option<f32>,
    /// Consecutive qualifying frames per event.
    #[arg(long)]
    frames: Option<u32>,
    /// Maximum evidence snapshots per session.
    #[arg(long)]
    max_captures: Option<u32>,
    /// Start with the alarm muted.
    #[arg(long)]
    muted: bool,
    /// Detector backend: scripted or tract.
    #[arg(long, default_value = "scripted")]
    backend: String,
    /// ONNX classifier path (tract backend).
    #[arg(long)]
    model: Option<PathBuf>,
    /// Comma-separated class labels in model output order (tract backend).
    #[arg(long)]
    labels: Option<String>,
    /// Model input width (tract backend).
    #[arg(long, default_value_t = 224)]
    model_width: u32,
    /// Model input height (tract backend).
    #[arg(long, default_value_t = 224)]
    model_height: u32,
    /// Frame rate assumed for image directories.
    #[arg(long)]
    fps: Option<f64>,
    /// Progress output: auto, plain or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
    /// List videos in a directory and exit.
    #[arg(long)]
    list: Option<PathBuf>,
    /// Process frames as fast as possible.
    #[arg(long)]
    no_pace: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(dir) = &args.list {
        for video in list_videos(dir)? {
            println!("{}", video.display());
        }
        return Ok(());
    }
    let source = args
        .source
        .clone()
        .ok_or_else(|| anyhow!("--source is required"))?;

    let config = SentinelConfig::load()?.with_overrides(&overrides(&args))?;

    let registry = build_registry(&args)?;
    let detector = registry.shared(Some(args.backend.as_str()))?;

    let hook: FailureHook = std::sync::Arc::new(|err: &SentinelError| {
        log::warn!("alert delivery failed: {}", err);
    });
    let worker = DispatchWorker::spawn(
        config.build_notifiers()?,
        config.notify.queue_capacity,
        config.notify.max_attachments,
        Some(hook),
    )
    .context("start notification worker")?;

    let control = SessionControl::new(config.alarm.muted);
    let dispatcher = worker.dispatcher(config.build_alarm()?, control.mute_switch());

    let mut settings = config.session_settings(&source);
    settings.source_options.fps_hint = args.fps;
    if args.no_pace {
        settings.pacing = PacingController::disabled();
    }

    let stop = control.clone();
    ctrlc::set_handler(move || {
        log::info!("stop requested");
        stop.request_stop();
    })
    .context("error setting Ctrl-C handler")?;
    if std::io::stdin().is_terminal() {
        spawn_keyboard(control.clone())?;
    }

    let controller = SessionController::new(settings, Box::new(detector), dispatcher, control);
    let handle = SessionHandle::start(controller)?;

    let mut view = ProgressView::new(
        UiMode::from_flag(Some(args.ui.as_str())),
        std::io::stderr().is_terminal(),
    );
    while !handle.is_finished() {
        view.update(&handle.control().snapshot());
        std::thread::sleep(POLL_INTERVAL);
    }
    let final_snapshot = handle.control().snapshot();
    let result = handle.join();
    view.update(&final_snapshot);
    worker.shutdown();

    let summary = result?;
    view.finish(&format!(
        "{}: {} frames, {} events, {} captures{}{}",
        summary.source_id,
        summary.frames_processed,
        summary.events_fired,
        summary.captures,
        if summary.notified { ", alert sent" } else { "" },
        if summary.cancelled { ", cancelled" } else { "" },
    ));
    if summary.captures > 0 {
        println!("{}", summary.evidence_dir.display());
    }
    Ok(())
}

fn overrides(args: &Args) -> ConfigOverrides {
    ConfigOverrides {
        output_root: args.output.clone(),
        confidence_threshold: args.confidence,
        consecutive_frames_required: args.frames,
        max_captures_per_session: args.max_captures,
        muted: args.muted,
    }
}

/// Line commands on stdin: `m` toggles mute, `q` stops. Ends at EOF.
fn spawn_keyboard(control: SessionControl) -> Result<()> {
    std::thread::Builder::new()
        .name("crash-sentinel-keys".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "m" | "M" => {
                        let muted = control.toggle_mute();
                        log::info!("alarm {}", if muted { "muted" } else { "unmuted" });
                    }
                    "q" | "Q" => {
                        log::info!("stop requested");
                        control.request_stop();
                    }
                    "" => {}
                    other => log::warn!("unknown command '{}' (m: mute, q: stop)", other),
                }
            }
        })
        .context("start keyboard thread")?;
    Ok(())
}

fn build_registry(args: &Args) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(ScriptedBackend::tint_keyed());

    if args.backend == "tract" {
        register_tract(&mut registry, args)?;
    } else if args.backend != "scripted" {
        return Err(anyhow!(
            "unknown backend '{}'; available: {}",
            args.backend,
            registry.list().join(", ")
        ));
    }
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, args: &Args) -> Result<()> {
    use crash_sentinel::detect::TractBackend;

    let model = args
        .model
        .as_ref()
        .ok_or_else(|| anyhow!("--model is required for the tract backend"))?;
    let labels = args.labels.as_deref().map(split_csv).unwrap_or_default();
    registry.register(TractBackend::new(
        model,
        args.model_width,
        args.model_height,
        labels,
    )?);
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, args: &Args) -> Result<()> {
    let _ = (&args.model, args.labels.as_deref().map(split_csv));
    Err(anyhow!(
        "the tract backend requires building with --features backend-tract"
    ))
}
