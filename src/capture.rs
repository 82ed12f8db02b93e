//! Evidence capture.
//!
//! Writes at most `capture_limit` annotated JPEG snapshots per session to
//! `<output_root>/<source_id>/accident_frame_NNNN.jpg`, numbering from 0001.
//! Reaching the limit is not an error: further calls are skipped without I/O.
//! A failed write leaves the count unchanged and no file on disk, so the next
//! event retries the same sequence number.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::episode::EventEpisode;
use crate::error::SentinelError;
use crate::frame::Frame;
use crate::overlay::draw_detection_overlay;

pub const EVIDENCE_PREFIX: &str = "accident_frame_";
pub const EVIDENCE_EXTENSION: &str = "jpg";
pub const DEFAULT_LABEL_TEXT: &str = "Accident Detected!";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of a capture request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A snapshot was written to this path.
    Captured(PathBuf),
    /// The episode already holds `capture_limit` snapshots.
    Skipped,
}

/// Capture settings.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub annotate: bool,
    pub label_text: String,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            annotate: true,
            label_text: DEFAULT_LABEL_TEXT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Writes evidence snapshots for one episode.
pub struct CaptureManager {
    settings: CaptureSettings,
    evidence_dir: PathBuf,
    dir_ready: bool,
}

impl CaptureManager {
    pub fn new(episode: &EventEpisode, settings: CaptureSettings) -> Self {
        Self {
            settings,
            evidence_dir: episode.evidence_dir(),
            dir_ready: false,
        }
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    /// Deterministic evidence filename for a 1-based sequence number.
    pub fn evidence_file_name(sequence: u32) -> String {
        format!("{}{:04}.{}", EVIDENCE_PREFIX, sequence, EVIDENCE_EXTENSION)
    }

    /// Persist `frame` for a fired event, unless the episode is full.
    pub fn on_event(
        &mut self,
        episode: &mut EventEpisode,
        frame: &Frame,
        annotated: bool,
    ) -> Result<CaptureOutcome, SentinelError> {
        if episode.is_full() {
            return Ok(CaptureOutcome::Skipped);
        }
        let path = self
            .evidence_dir
            .join(Self::evidence_file_name(episode.next_sequence()));
        self.write_snapshot(&path, frame, annotated && self.settings.annotate)
            .map_err(|e| SentinelError::CaptureWrite {
                path: path.clone(),
                reason: format!("{:#}", e),
            })?;
        episode.record_capture();
        log::info!(
            "captured evidence {} ({}/{})",
            path.display(),
            episode.captured_count(),
            episode.capture_limit()
        );
        Ok(CaptureOutcome::Captured(path))
    }

    fn write_snapshot(&mut self, path: &Path, frame: &Frame, annotate: bool) -> Result<()> {
        self.ensure_dir()?;
        let mut image = frame.to_rgb_image()?;
        if annotate {
            let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
            draw_detection_overlay(&mut image, &self.settings.label_text, &timestamp);
        }
        // Encode to a `.part` sibling, then rename. A failed write leaves no file.
        let partial = partial_path(path);
        let written = self
            .encode_jpeg(&partial, &image)
            .and_then(|()| {
                fs::rename(&partial, path)
                    .with_context(|| format!("failed to move snapshot to {}", path.display()))
            });
        if written.is_err() {
            let _ = fs::remove_file(&partial);
        }
        written
    }

    fn encode_jpeg(&self, path: &Path, image: &image::RgbImage) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.settings.jpeg_quality)
            .encode_image(image)
            .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }

    fn ensure_dir(&mut self) -> Result<()> {
        if self.dir_ready {
            return Ok(());
        }
        fs::create_dir_all(&self.evidence_dir).with_context(|| {
            format!(
                "failed to create evidence dir {}",
                self.evidence_dir.display()
            )
        })?;
        self.dir_ready = true;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Evidence files in `dir`, ascending by file name, at most `limit`.
pub fn evidence_files(dir: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to list evidence in {}", dir.display()))
        }
    };
    for entry in entries {
        let path = entry?.path();
        let is_evidence = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(EVIDENCE_EXTENSION));
        if is_evidence {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files.truncate(limit);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(index: u64) -> Frame {
        Frame::new(index, Duration::ZERO, 160, 120, vec![40u8; 160 * 120 * 3]).unwrap()
    }

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(CaptureManager::evidence_file_name(1), "accident_frame_0001.jpg");
        assert_eq!(CaptureManager::evidence_file_name(42), "accident_frame_0042.jpg");
    }

    #[test]
    fn writes_until_limit_then_skips() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut episode = EventEpisode::new(root.path(), "clip", 2);
        let mut capture = CaptureManager::new(&episode, CaptureSettings::default());

        let first = capture.on_event(&mut episode, &frame(1), true)?;
        let second = capture.on_event(&mut episode, &frame(2), false)?;
        let third = capture.on_event(&mut episode, &frame(3), true)?;

        let dir = root.path().join("clip");
        assert_eq!(
            first,
            CaptureOutcome::Captured(dir.join("accident_frame_0001.jpg"))
        );
        assert_eq!(
            second,
            CaptureOutcome::Captured(dir.join("accident_frame_0002.jpg"))
        );
        assert_eq!(third, CaptureOutcome::Skipped);
        assert_eq!(episode.captured_count(), 2);
        assert_eq!(fs::read_dir(&dir)?.count(), 2);
        Ok(())
    }

    #[test]
    fn annotated_capture_differs_from_plain_frame() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut episode = EventEpisode::new(root.path(), "clip", 5);
        let mut capture = CaptureManager::new(&episode, CaptureSettings::default());

        let CaptureOutcome::Captured(path) = capture.on_event(&mut episode, &frame(1), true)?
        else {
            panic!("expected capture");
        };
        let written = image::open(&path)?.to_rgb8();
        assert_eq!(written.dimensions(), (160, 120));
        // Inside the label box the pixel is near white instead of the frame's gray.
        let px = written.get_pixel(22, 22);
        assert!(px[0] > 200 && px[1] > 200 && px[2] > 200, "pixel {:?}", px);
        Ok(())
    }

    #[test]
    fn write_failure_does_not_consume_a_slot() -> Result<()> {
        let root = tempfile::tempdir()?;
        // A regular file where the output root should be makes create_dir_all fail.
        let blocked = root.path().join("blocked");
        fs::write(&blocked, b"not a directory")?;
        let mut episode = EventEpisode::new(&blocked, "clip", 5);
        let mut capture = CaptureManager::new(&episode, CaptureSettings::default());

        let err = capture.on_event(&mut episode, &frame(1), true).unwrap_err();
        assert!(matches!(err, SentinelError::CaptureWrite { .. }));
        assert_eq!(episode.captured_count(), 0);
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_partial_file() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("clip");
        // A directory squatting on the target name makes the final rename fail.
        fs::create_dir_all(dir.join("accident_frame_0001.jpg"))?;
        let mut episode = EventEpisode::new(root.path(), "clip", 5);
        let mut capture = CaptureManager::new(&episode, CaptureSettings::default());

        let err = capture.on_event(&mut episode, &frame(1), true).unwrap_err();
        assert!(matches!(err, SentinelError::CaptureWrite { .. }));
        assert_eq!(episode.captured_count(), 0);
        let names: Vec<_> = fs::read_dir(&dir)?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("accident_frame_0001.jpg")]);
        assert!(evidence_files(&dir, 5)?.is_empty());
        Ok(())
    }

    #[test]
    fn evidence_listing_is_sorted_and_capped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "accident_frame_0003.jpg",
            "accident_frame_0001.jpg",
            "accident_frame_0002.jpg",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"x")?;
        }
        let names: Vec<String> = evidence_files(dir.path(), 2)?
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["accident_frame_0001.jpg", "accident_frame_0002.jpg"]);
        assert!(evidence_files(&dir.path().join("missing"), 5)?.is_empty());
        Ok(())
    }
}
