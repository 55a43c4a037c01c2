//! Source URL classification.
//!
//! The classification order is part of the service's compatibility surface:
//! empty, `test://`, streaming schemes, HTTP, device nodes, then video file
//! extensions, then any existing file on disk.

use std::path::Path;

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv", ".webm"];
const RTSP_PREFIXES: &[&str] = &["rtsp://", "rtmp://", "rtp://"];
const HTTP_PREFIXES: &[&str] = &["http://", "https://"];
const WEBCAM_PREFIXES: &[&str] = &["/dev/video", "/dev/v4l/by-id/"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Source kind inferred from a camera URL.
pub enum CameraType {
    Unknown,
    FileVideo,
    Webcam,
    RtspStream,
    HttpStream,
    TestPattern,
}

impl CameraType {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraType::Unknown => "UNKNOWN",
            CameraType::FileVideo => "FILE_VIDEO",
            CameraType::Webcam => "WEBCAM",
            CameraType::RtspStream => "RTSP_STREAM",
            CameraType::HttpStream => "HTTP_STREAM",
            CameraType::TestPattern => "TEST_PATTERN",
        }
    }
}

/// Classify a camera URL. Pure function; first matching rule wins.
pub fn classify_url(url: &str) -> CameraType {
    if url.is_empty() {
        return CameraType::Unknown;
    }

    if url == "test://pattern" || url.starts_with("test://") {
        return CameraType::TestPattern;
    }

    if RTSP_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return CameraType::RtspStream;
    }

    if HTTP_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return CameraType::HttpStream;
    }

    if WEBCAM_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return CameraType::Webcam;
    }

    if VIDEO_EXTENSIONS.iter().any(|ext| url.ends_with(ext)) {
        return CameraType::FileVideo;
    }

    if Path::new(url).is_file() {
        return CameraType::FileVideo;
    }

    CameraType::Unknown
}

/// Whether a URL maps to a source the service can open.
pub fn is_valid_camera_url(url: &str) -> bool {
    classify_url(url) != CameraType::Unknown
}

/// Parse a `/dev/videoN` style path and return the zero-based device index.
///
/// Returns `None` for non-numeric suffixes and for indices that do not fit
/// in an `i32`; callers treat that as an initialization error.
pub fn parse_device_index(url: &str) -> Option<i32> {
    let suffix = url.strip_prefix("/dev/video")?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<i32>().ok()
}

/// Scan for webcam device nodes (`/dev/video0` through `/dev/video9`).
pub fn available_webcams() -> Vec<String> {
    (0..10)
        .map(|i| format!("/dev/video{i}"))
        .filter(|device| Path::new(device).exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn classification_table() {
        assert_eq!(classify_url(""), CameraType::Unknown);
        assert_eq!(classify_url("test://pattern"), CameraType::TestPattern);
        assert_eq!(classify_url("test://checkerboard"), CameraType::TestPattern);
        assert_eq!(classify_url("rtsp://example.com/stream"), CameraType::RtspStream);
        assert_eq!(classify_url("rtmp://example.com/live"), CameraType::RtspStream);
        assert_eq!(classify_url("rtp://10.0.0.1:5004"), CameraType::RtspStream);
        assert_eq!(classify_url("http://host/stream.mjpg"), CameraType::HttpStream);
        assert_eq!(classify_url("https://host/cam"), CameraType::HttpStream);
        assert_eq!(classify_url("/dev/video2"), CameraType::Webcam);
        assert_eq!(classify_url("/dev/v4l/by-id/usb-cam-0"), CameraType::Webcam);
        assert_eq!(classify_url("movie.mp4"), CameraType::FileVideo);
        assert_eq!(classify_url("clip.webm"), CameraType::FileVideo);
        assert_eq!(classify_url("not-a-url"), CameraType::Unknown);
    }

    #[test]
    fn scheme_beats_extension() {
        assert_eq!(classify_url("rtsp://host/archive.mp4"), CameraType::RtspStream);
        assert_eq!(classify_url("http://host/clip.avi"), CameraType::HttpStream);
    }

    #[test]
    fn existing_file_without_known_extension_is_file_video() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really a video").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert_eq!(classify_url(&path), CameraType::FileVideo);
    }

    #[test]
    fn device_index_parsing() {
        assert_eq!(parse_device_index("/dev/video0"), Some(0));
        assert_eq!(parse_device_index("/dev/video12"), Some(12));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("/dev/video99999999999999999999"), None);
        assert_eq!(parse_device_index("/dev/v4l/by-id/usb-cam-0"), None);
    }

    #[test]
    fn url_validity_follows_classification() {
        assert!(is_valid_camera_url("test://pattern"));
        assert!(is_valid_camera_url("rtsp://host/stream"));
        assert!(!is_valid_camera_url(""));
        assert!(!is_valid_camera_url("not-a-url"));
    }

    #[test]
    fn classification_is_pure() {
        let url = "rtsp://host/stream";
        let first = classify_url(url);
        for _ in 0..3 {
            assert_eq!(classify_url(url), first);
        }
    }
}
