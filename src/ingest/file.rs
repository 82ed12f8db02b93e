//! Video file and stream source.
//!
//! This module provides `FileSource` for decoding frames from local video files
//! and from network streams (`rtsp://`, `http(s)://`). Decoding is delegated to
//! FFmpeg behind the `ingest-ffmpeg` feature. Without it, opening any video
//! reference fails, which the session reports as a source-open error.

use anyhow::{anyhow, Result};
use std::path::Path;

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{sanitize_source_id, source_id_from_path, FrameSource, SourceStats};
use crate::frame::Frame;

const STREAM_SCHEMES: [&str; 4] = ["rtsp://", "rtsps://", "http://", "https://"];

/// Video file or stream source.
pub struct FileSource {
    backend: FileBackend,
    source_id: String,
}

enum FileBackend {
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    #[cfg(not(feature = "ingest-ffmpeg"))]
    #[allow(dead_code)]
    Unavailable,
}

impl FileSource {
    pub fn open(source_ref: &str) -> Result<Self> {
        let live = is_stream_reference(source_ref);
        if !live && source_ref.contains("://") {
            return Err(anyhow!(
                "unsupported scheme in '{}'; expected a local path or rtsp/http stream",
                source_ref
            ));
        }
        if !live && !Path::new(source_ref).is_file() {
            return Err(anyhow!("no such video file: {}", source_ref));
        }
        let source_id = if live {
            stream_source_id(source_ref)
        } else {
            source_id_from_path(Path::new(source_ref))
        };

        #[cfg(feature = "ingest-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(source_ref, live)?),
                source_id,
            })
        }
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            let _ = source_id;
            Err(anyhow!("video decoding requires the ingest-ffmpeg feature"))
        }
    }
}

impl FrameSource for FileSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
            #[cfg(not(feature = "ingest-ffmpeg"))]
            FileBackend::Unavailable => Ok(None),
        }
    }

    fn native_interval_ms(&self) -> Option<f64> {
        match &self.backend {
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.native_interval_ms(),
            #[cfg(not(feature = "ingest-ffmpeg"))]
            FileBackend::Unavailable => None,
        }
    }

    fn total_frames(&self) -> Option<u64> {
        match &self.backend {
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.total_frames(),
            #[cfg(not(feature = "ingest-ffmpeg"))]
            FileBackend::Unavailable => None,
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            #[cfg(feature = "ingest-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
            #[cfg(not(feature = "ingest-ffmpeg"))]
            FileBackend::Unavailable => SourceStats {
                frames_read: 0,
                source: self.source_id.clone(),
            },
        }
    }
}

fn is_stream_reference(source_ref: &str) -> bool {
    let lower = source_ref.to_lowercase();
    STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Stream ids come from the last path segment, falling back to the host.
fn stream_source_id(source_ref: &str) -> String {
    match url::Url::parse(source_ref) {
        Ok(url) => {
            let segment = url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|segment| !segment.is_empty());
            let name = segment
                .map(|s| s.rsplit_once('.').map(|(stem, _)| stem.to_string()).unwrap_or(s))
                .or_else(|| url.host_str().map(str::to_string))
                .unwrap_or_default();
            sanitize_source_id(&name)
        }
        Err(_) => sanitize_source_id(source_ref),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_prefer_last_path_segment() {
        assert_eq!(
            stream_source_id("rtsp://10.0.0.5:554/live/Intersection-4"),
            "intersection-4"
        );
        assert_eq!(stream_source_id("http://cam.local/feed.mjpg"), "feed");
        assert_eq!(stream_source_id("rtsp://camera-9/"), "camera-9");
    }

    #[test]
    fn recognizes_stream_schemes() {
        assert!(is_stream_reference("RTSP://cam/stream"));
        assert!(is_stream_reference("https://example.com/x.mp4"));
        assert!(!is_stream_reference("/videos/crash.mp4"));
    }

    #[test]
    fn missing_file_fails_to_open() {
        assert!(FileSource::open("/definitely/not/here.mp4").is_err());
        assert!(FileSource::open("ftp://host/video.mp4").is_err());
    }
}
