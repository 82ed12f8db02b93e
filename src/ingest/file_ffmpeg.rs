//! FFmpeg-backed video decoding.
//!
//! Opens local files and network streams, decodes the best video track and
//! converts every frame to RGB24 in memory. End of input is reported as `None`
//! after the decoder has been drained.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::Duration;

use super::SourceStats;
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    source_ref: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    native_interval_ms: Option<f64>,
    total_frames: Option<u64>,
    frame_count: u64,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(source_ref: &str, live: bool) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&source_ref)
            .with_context(|| format!("failed to open '{}' with ffmpeg", source_ref))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", source_ref))?;
        let stream_index = input_stream.index();

        let rate = input_stream.avg_frame_rate();
        let native_interval_ms = if rate.numerator() > 0 && rate.denominator() > 0 {
            Some(1000.0 * rate.denominator() as f64 / rate.numerator() as f64)
        } else {
            None
        };
        let total_frames = match input_stream.frames() {
            n if n > 0 && !live => Some(n as u64),
            _ => None,
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: opened {} (ffmpeg, interval={:?}ms, frames={:?})",
            source_ref,
            native_interval_ms,
            total_frames
        );

        Ok(Self {
            source_ref: source_ref.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            native_interval_ms,
            total_frames,
            frame_count: 0,
            eof_sent: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        let stream_index = self.stream_index;
        self.input
            .packets()
            .find(|(stream, _)| stream.index() == stream_index)
            .map(|(_, packet)| packet)
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.frame_count += 1;
        let timestamp = Duration::from_micros(
            (self.native_interval_ms.unwrap_or(0.0) * 1000.0 * (self.frame_count - 1) as f64)
                .round() as u64,
        );
        Frame::new(self.frame_count, timestamp, width, height, pixels)
    }

    pub(crate) fn native_interval_ms(&self) -> Option<f64> {
        self.native_interval_ms
    }

    pub(crate) fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.source_ref.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
