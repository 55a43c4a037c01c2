//! Source-specific capture backends.
//!
//! File, webcam, and RTSP sources decode through OpenCV when the
//! `opencv-backend` feature is enabled; without it they degrade to synthetic
//! frames so the rest of the pipeline stays exercisable. The test-pattern
//! source never needs a decoder.

use crate::{
    classify::parse_device_index, CameraConfig, CameraType, CaptureError, Frame, FrameFormat,
    TestPatternGenerator,
};

/// How many frames each synthetic pattern is held before rotating.
const PATTERN_HOLD_SECONDS: u64 = 5;

pub(crate) enum CaptureBackend {
    #[cfg(feature = "opencv-backend")]
    Decoder(DecoderBackend),
    Synthetic(SyntheticBackend),
    Pattern(PatternBackend),
    #[cfg(test)]
    Failing,
}

impl CaptureBackend {
    /// Open the backend matching the classified source type.
    pub(crate) fn open(
        camera_type: CameraType,
        url: &str,
        config: &CameraConfig,
    ) -> Result<Self, CaptureError> {
        match camera_type {
            CameraType::TestPattern => Ok(CaptureBackend::Pattern(PatternBackend::new(config))),
            CameraType::Webcam => {
                if url.starts_with("/dev/video") && parse_device_index(url).is_none() {
                    return Err(CaptureError::Open {
                        uri: url.to_string(),
                        reason: "invalid webcam device index".to_string(),
                    });
                }
                Self::open_decoder(camera_type, url, config)
            }
            CameraType::FileVideo | CameraType::RtspStream => {
                Self::open_decoder(camera_type, url, config)
            }
            CameraType::HttpStream | CameraType::Unknown => Err(CaptureError::Unsupported {
                uri: url.to_string(),
                kind: camera_type.as_str(),
            }),
        }
    }

    #[cfg(feature = "opencv-backend")]
    fn open_decoder(
        camera_type: CameraType,
        url: &str,
        config: &CameraConfig,
    ) -> Result<Self, CaptureError> {
        DecoderBackend::open(camera_type, url, config).map(CaptureBackend::Decoder)
    }

    #[cfg(not(feature = "opencv-backend"))]
    fn open_decoder(
        _camera_type: CameraType,
        url: &str,
        config: &CameraConfig,
    ) -> Result<Self, CaptureError> {
        tracing::debug!(
            url,
            "opencv backend not compiled in; serving synthetic frames"
        );
        Ok(CaptureBackend::Synthetic(SyntheticBackend::new(config)))
    }

    /// Pull the next frame from the source.
    pub(crate) fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        match self {
            #[cfg(feature = "opencv-backend")]
            CaptureBackend::Decoder(decoder) => decoder.capture_frame(),
            CaptureBackend::Synthetic(synthetic) => Ok(synthetic.capture_frame()),
            CaptureBackend::Pattern(pattern) => Ok(pattern.capture_frame()),
            #[cfg(test)]
            CaptureBackend::Failing => Err(CaptureError::Capture(
                "test backend always fails".to_string(),
            )),
        }
    }
}

/// Decoder-less stand-in for file/webcam/RTSP sources.
pub(crate) struct SyntheticBackend {
    width: i32,
    height: i32,
    format: FrameFormat,
}

impl SyntheticBackend {
    fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            format: config.format,
        }
    }

    fn capture_frame(&mut self) -> Frame {
        Frame::test_frame(self.width, self.height, self.format)
    }
}

/// Rotating synthetic pattern source for `test://` sessions.
pub(crate) struct PatternBackend {
    generator: TestPatternGenerator,
    fps: i32,
    captured: u64,
}

impl PatternBackend {
    fn new(config: &CameraConfig) -> Self {
        Self {
            generator: TestPatternGenerator::new(config.width, config.height),
            fps: config.fps,
            captured: 0,
        }
    }

    fn capture_frame(&mut self) -> Frame {
        let hold = PATTERN_HOLD_SECONDS * self.fps.max(1) as u64;
        let phase = (self.captured / hold) % 5;
        self.captured += 1;

        match phase {
            0 => self.generator.color_bars(),
            1 => self.generator.checkerboard(),
            2 => self.generator.moving_box(),
            3 => self.generator.noise(),
            _ => self.generator.time_code(),
        }
    }
}

#[cfg(feature = "opencv-backend")]
pub(crate) use decoder::DecoderBackend;

#[cfg(feature = "opencv-backend")]
mod decoder {
    use opencv::{
        core::MatTraitConstManual,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };

    use super::*;

    /// OpenCV-backed reader for file, webcam, and RTSP sources.
    pub(crate) struct DecoderBackend {
        capture: VideoCapture,
        uri: String,
    }

    impl DecoderBackend {
        pub(crate) fn open(
            camera_type: CameraType,
            url: &str,
            config: &CameraConfig,
        ) -> Result<Self, CaptureError> {
            let mut capture = match camera_type {
                CameraType::Webcam => match parse_device_index(url) {
                    Some(index) => open_by_index(index, url)?,
                    // /dev/v4l/by-id paths open directly.
                    None => open_by_uri(url)?,
                },
                _ => open_by_uri(url)?,
            };

            let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64);
            let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64);
            let _ = capture.set(videoio::CAP_PROP_FPS, config.fps as f64);

            Ok(Self {
                capture,
                uri: url.to_string(),
            })
        }

        pub(crate) fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
            let mut mat = Mat::default();
            let read_ok = self
                .capture
                .read(&mut mat)
                .map_err(|err| CaptureError::Capture(err.to_string()))?;
            if !read_ok {
                return Err(CaptureError::Capture(format!(
                    "decoder returned no frame for {}",
                    self.uri
                )));
            }

            let size = mat
                .size()
                .map_err(|err| CaptureError::Capture(err.to_string()))?;
            if size.width <= 0 || size.height <= 0 {
                return Err(CaptureError::Capture(format!(
                    "decoder returned empty frame for {}",
                    self.uri
                )));
            }

            let data = mat
                .data_bytes()
                .map_err(|err| CaptureError::Capture(err.to_string()))?
                .to_vec();

            Ok(Frame::new(data, size.width, size.height, FrameFormat::Bgr))
        }
    }

    fn open_by_index(index: i32, url: &str) -> Result<VideoCapture, CaptureError> {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            if let Ok(capture) = VideoCapture::new(index, backend) {
                if capture.is_opened().unwrap_or(false) {
                    return Ok(capture);
                }
            }
        }
        Err(CaptureError::Open {
            uri: url.to_string(),
            reason: format!("could not open device #{index}"),
        })
    }

    fn open_by_uri(url: &str) -> Result<VideoCapture, CaptureError> {
        if let Ok(capture) = VideoCapture::from_file(url, videoio::CAP_ANY) {
            if capture.is_opened().unwrap_or(false) {
                return Ok(capture);
            }
        }
        Err(CaptureError::Open {
            uri: url.to_string(),
            reason: "decoder could not open source".to_string(),
        })
    }
}
