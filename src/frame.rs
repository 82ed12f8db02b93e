//! Decoded frame container.
//!
//! - `Frame`: Immutable RGB pixel buffer with a monotonically increasing index
//!   and a logical timestamp taken from the source's own clock.
//!
//! A frame is owned by the loop iteration that read it. Nothing downstream keeps
//! a reference past that iteration; evidence capture works on a copy obtained
//! through `Frame::to_rgb_image`.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Duration;

/// Bytes per pixel for the RGB24 layout every source normalizes to.
pub const RGB_CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded RGB24 frame.
///
/// There is no `&mut` access to pixels once constructed. Cloning is explicit and
/// only evidence capture needs it.
#[derive(Clone)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
    timestamp: Duration,
}

impl Frame {
    /// Build a frame, checking that the buffer matches `width * height * 3`.
    pub fn new(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {} expected {} RGB bytes for {}x{}, received {}",
                index,
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
            timestamp,
        })
    }

    /// 1-based position of this frame in its source.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Logical timestamp (source presentation time, not wall clock).
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Read-only pixel slice for detector backends.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy the pixels into an owned image for annotation and encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame {} buffer does not fit its dimensions", self.index))
    }

    /// Mean value of one channel, used by cheap heuristics and tests.
    pub fn channel_mean(&self, channel: usize) -> f32 {
        if channel >= RGB_CHANNELS || self.pixels.is_empty() {
            return 0.0;
        }
        let (sum, count) = self
            .pixels
            .iter()
            .skip(channel)
            .step_by(RGB_CHANNELS)
            .fold((0u64, 0u64), |(sum, count), &p| (sum + p as u64, count + 1));
        if count == 0 {
            0.0
        } else {
            sum as f32 / count as f32
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel payload intentionally omitted from debug output.
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGB_CHANNELS)
            .collect();
        Frame::new(1, Duration::ZERO, width, height, pixels).expect("frame")
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::new(1, Duration::ZERO, 4, 4, vec![0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("expected 48 RGB bytes"));
    }

    #[test]
    fn image_copy_does_not_alias_pixels() {
        let frame = solid(2, 2, [10, 20, 30]);
        let mut image = frame.to_rgb_image().unwrap();
        image.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
    }

    #[test]
    fn channel_mean_reads_requested_channel() {
        let frame = solid(3, 3, [200, 0, 50]);
        assert_eq!(frame.channel_mean(0), 200.0);
        assert_eq!(frame.channel_mean(1), 0.0);
        assert_eq!(frame.channel_mean(2), 50.0);
        assert_eq!(frame.channel_mean(3), 0.0);
    }
}
