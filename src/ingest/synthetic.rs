//! Synthetic frame source (`stub://`).
//!
//! Generates deterministic frames without any decoder. Reference shape:
//!
//! `stub://<name>?frames=10&fps=30&hot=4-6,9-9&width=64&height=48`
//!
//! - `frames`: total frame count; omitted means an endless live-like stream
//! - `fps`: native rate; omitted means the source reports no native interval
//! - `hot`: 1-based inclusive frame ranges rendered with the accident tint that
//!   `ScriptedBackend::tint_keyed` reports as an accident
//! - `width`/`height`: frame size (default 64x48)

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::{sanitize_source_id, FrameSource, SourceStats};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub total_frames: Option<u64>,
    pub fps: Option<f64>,
    pub hot_ranges: Vec<(u64, u64)>,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            total_frames: None,
            fps: None,
            hot_ranges: Vec::new(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Deterministic generated frame source.
pub struct SyntheticSource {
    config: SyntheticConfig,
    source_id: String,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero"));
        }
        if config.fps.is_some_and(|fps| !(fps > 0.0 && fps.is_finite())) {
            return Err(anyhow!("synthetic fps must be positive"));
        }
        for &(first, last) in &config.hot_ranges {
            if first == 0 || last < first {
                return Err(anyhow!("invalid hot range {}-{}", first, last));
            }
        }
        let source_id = sanitize_source_id(&config.name);
        log::info!("SyntheticSource: opened {} (synthetic)", config.name);
        Ok(Self {
            config,
            source_id,
            frame_count: 0,
        })
    }

    /// Parse a `stub://` reference.
    pub fn parse(source_ref: &str) -> Result<Self> {
        let url = Url::parse(source_ref).context("parse stub url")?;
        if url.scheme() != "stub" {
            return Err(anyhow!("expected stub:// scheme, got '{}'", url.scheme()));
        }
        let mut config = SyntheticConfig {
            name: url.host_str().unwrap_or("synthetic").to_string(),
            ..SyntheticConfig::default()
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => {
                    config.total_frames =
                        Some(value.parse().context("frames must be an integer")?)
                }
                "fps" => config.fps = Some(value.parse().context("fps must be a number")?),
                "width" => config.width = value.parse().context("width must be an integer")?,
                "height" => config.height = value.parse().context("height must be an integer")?,
                "hot" => config.hot_ranges = parse_ranges(&value)?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        Self::new(config)
    }

    fn is_hot(&self, index: u64) -> bool {
        self.config
            .hot_ranges
            .iter()
            .any(|&(first, last)| (first..=last).contains(&index))
    }

    fn generate_pixels(&self, index: u64) -> Vec<u8> {
        let width = self.config.width as u64;
        let pixel_count = self.config.width as usize * self.config.height as usize;
        let hot = self.is_hot(index);
        let mut pixels = Vec::with_capacity(pixel_count * 3);
        for i in 0..pixel_count as u64 {
            let (x, y) = (i % width, i / width);
            let shade = ((x + y + index) % 48) as u8;
            if hot {
                pixels.extend_from_slice(&[200 + shade, 16 + shade / 2, 16 + shade / 2]);
            } else {
                pixels.extend_from_slice(&[96 + shade, 112 + shade, 96 + shade]);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .total_frames
            .is_some_and(|total| self.frame_count >= total)
        {
            return Ok(None);
        }
        self.frame_count += 1;
        let index = self.frame_count;
        let interval_ms = self.native_interval_ms().unwrap_or(0.0);
        let timestamp =
            Duration::from_micros((interval_ms * 1000.0 * (index - 1) as f64).round() as u64);
        let frame = Frame::new(
            index,
            timestamp,
            self.config.width,
            self.config.height,
            self.generate_pixels(index),
        )?;
        Ok(Some(frame))
    }

    fn native_interval_ms(&self) -> Option<f64> {
        self.config.fps.map(|fps| 1000.0 / fps)
    }

    fn total_frames(&self) -> Option<u64> {
        self.config.total_frames
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: format!("stub://{}", self.config.name),
        }
    }
}

fn parse_ranges(value: &str) -> Result<Vec<(u64, u64)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (first, last) = match entry.split_once('-') {
                Some((first, last)) => (first, last),
                None => (entry, entry),
            };
            let first: u64 = first
                .trim()
                .parse()
                .with_context(|| format!("invalid hot range '{}'", entry))?;
            let last: u64 = last
                .trim()
                .parse()
                .with_context(|| format!("invalid hot range '{}'", entry))?;
            Ok((first, last))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_parameters() -> Result<()> {
        let source = SyntheticSource::parse("stub://Crash_Demo?frames=10&fps=25&hot=4-6,9")?;
        assert_eq!(source.source_id(), "crash_demo");
        assert_eq!(source.total_frames(), Some(10));
        assert_eq!(source.native_interval_ms(), Some(40.0));
        assert_eq!(source.config.hot_ranges, vec![(4, 6), (9, 9)]);
        Ok(())
    }

    #[test]
    fn finite_source_exhausts() -> Result<()> {
        let mut source = SyntheticSource::parse("stub://short?frames=2&fps=10")?;
        let first = source.next_frame()?.expect("frame 1");
        let second = source.next_frame()?.expect("frame 2");
        assert_eq!(first.index(), 1);
        assert_eq!(second.index(), 2);
        assert_eq!(second.timestamp(), Duration::from_millis(100));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_read, 2);
        Ok(())
    }

    #[test]
    fn endless_source_has_no_total_or_rate() -> Result<()> {
        let mut source = SyntheticSource::parse("stub://live")?;
        assert_eq!(source.total_frames(), None);
        assert_eq!(source.native_interval_ms(), None);
        for _ in 0..5 {
            assert!(source.next_frame()?.is_some());
        }
        Ok(())
    }

    #[test]
    fn hot_frames_are_red_tinted() -> Result<()> {
        let mut source = SyntheticSource::parse("stub://tint?frames=3&hot=2")?;
        let cold = source.next_frame()?.unwrap();
        let hot = source.next_frame()?.unwrap();
        assert!(cold.channel_mean(0) < 180.0);
        assert!(hot.channel_mean(0) >= 180.0);
        assert!(hot.channel_mean(1) <= 80.0);
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SyntheticSource::parse("stub://x?frames=abc").is_err());
        assert!(SyntheticSource::parse("stub://x?hot=5-2").is_err());
        assert!(SyntheticSource::parse("stub://x?fps=0").is_err());
        assert!(SyntheticSource::parse("stub://x?color=red").is_err());
    }
}
