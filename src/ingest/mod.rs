//! Frame ingestion sources.
//!
//! This module provides different sources for decoded frames:
//! - Local video files and network streams (feature: ingest-ffmpeg)
//! - Directories of still images (jpg/png)
//! - Synthetic `stub://` sources (testing, demos)
//!
//! Every source yields an ordered, lazy sequence of `Frame`s and reports its
//! native pacing interval and total frame count when it knows them. Live
//! streams report no total. Dropping a source releases it.

mod file;
#[cfg(feature = "ingest-ffmpeg")]
mod file_ffmpeg;
mod images;
mod synthetic;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::SentinelError;
use crate::frame::Frame;

pub use file::FileSource;
pub use images::ImageSequenceSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Extensions recognized as video inputs by `list_videos`.
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

const MAX_SOURCE_ID_LEN: usize = 64;
const FALLBACK_SOURCE_ID: &str = "source";

/// Frame source trait.
pub trait FrameSource: Send {
    /// Sanitized identity used to namespace evidence directories.
    fn source_id(&self) -> &str;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Native presentation interval, when the source knows it.
    fn native_interval_ms(&self) -> Option<f64>;

    /// Total frame count, when known (never for live streams).
    fn total_frames(&self) -> Option<u64>;

    /// Frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_read: u64,
    pub source: String,
}

/// Hints applied when opening a source.
#[derive(Clone, Debug, Default)]
pub struct SourceOptions {
    /// Frame rate assumed for sources without one (image directories).
    pub fps_hint: Option<f64>,
}

/// Open `source_ref` with the backend its shape calls for.
///
/// - `stub://name?...` opens a `SyntheticSource`
/// - an existing directory opens an `ImageSequenceSource`
/// - anything else goes to `FileSource` (video files and streams)
pub fn open_source(
    source_ref: &str,
    options: &SourceOptions,
) -> Result<Box<dyn FrameSource>, SentinelError> {
    if source_ref.trim().is_empty() {
        return Err(SentinelError::source_open(source_ref, "empty source reference"));
    }
    let opened: Result<Box<dyn FrameSource>> = if source_ref.starts_with("stub://") {
        SyntheticSource::parse(source_ref).map(|s| Box::new(s) as Box<dyn FrameSource>)
    } else if Path::new(source_ref).is_dir() {
        ImageSequenceSource::open(Path::new(source_ref), options.fps_hint)
            .map(|s| Box::new(s) as Box<dyn FrameSource>)
    } else {
        FileSource::open(source_ref).map(|s| Box::new(s) as Box<dyn FrameSource>)
    };
    opened.map_err(|e| SentinelError::source_open(source_ref, format!("{:#}", e)))
}

/// Sanitize a name for use as a source id.
///
/// - Converts to lowercase
/// - Replaces anything outside `[a-z0-9_-]` with '_'
/// - Limits length to 64 characters
/// - Falls back to "source" when nothing usable remains
pub fn sanitize_source_id(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SOURCE_ID_LEN)
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_SOURCE_ID.to_string()
    } else {
        sanitized
    }
}

/// Source id derived from a path's file stem.
pub(crate) fn source_id_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_source_id(&stem)
}

/// Video files directly inside `dir`, sorted by file name.
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list videos in {}", dir.display()))?;
    let mut videos = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, &VIDEO_EXTENSIONS) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}
