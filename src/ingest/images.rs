//! Still-image directory source.
//!
//! Treats a directory of `.jpg`/`.jpeg`/`.png` files as a clip, ordered by file
//! name. Decoding is lazy: one file per `next_frame` call. Files that fail to
//! decode are skipped with a warning so one corrupt still does not end the clip.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{has_extension, source_id_from_path, FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Ordered still-image source.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    fps: Option<f64>,
    source_id: String,
    frame_count: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: Option<f64>) -> Result<Self> {
        if fps.is_some_and(|fps| !(fps > 0.0 && fps.is_finite())) {
            return Err(anyhow!("image sequence fps must be positive"));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, &IMAGE_EXTENSIONS) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no jpg/png images in {}", dir.display()));
        }
        files.sort();
        log::info!(
            "ImageSequenceSource: opened {} ({} images)",
            dir.display(),
            files.len()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            cursor: 0,
            fps,
            source_id: source_id_from_path(dir),
            frame_count: 0,
        })
    }

    fn decode(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        Ok((width, height, image.into_raw()))
    }
}

impl FrameSource for ImageSequenceSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(path) = self.files.get(self.cursor) {
            self.cursor += 1;
            let (width, height, pixels) = match Self::decode(path) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("ImageSequenceSource: skipping {:#}", e);
                    continue;
                }
            };
            self.frame_count += 1;
            let interval_ms = self.native_interval_ms().unwrap_or(0.0);
            let timestamp = Duration::from_micros(
                (interval_ms * 1000.0 * (self.frame_count - 1) as f64).round() as u64,
            );
            return Frame::new(self.frame_count, timestamp, width, height, pixels).map(Some);
        }
        Ok(None)
    }

    fn native_interval_ms(&self) -> Option<f64> {
        self.fps.map(|fps| 1000.0 / fps)
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.files.len() as u64)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.dir.display().to_string(),
        }
    }
}
