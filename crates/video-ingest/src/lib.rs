//! Per-session video capture for the vision ingest service.
//!
//! The crate is split into focused submodules:
//! - `frame`: frame value type, pixel formats, and fill utilities.
//! - `classify`: source URL classification and webcam device parsing.
//! - `config`: capture configuration, state machine, and statistics.
//! - `pattern`: synthetic test-pattern generator.
//! - `backend`: source-specific decode backends.
//! - `engine`: the capture engine driving a worker thread per session.

use thiserror::Error;

pub use classify::{
    available_webcams, classify_url, is_valid_camera_url, parse_device_index, CameraType,
};
pub use config::{CameraConfig, CameraState, CameraStats};
pub use engine::{CaptureEngine, FrameCallback};
pub use frame::{convert_format, expected_frame_size, Frame, FrameFormat};
pub use pattern::TestPatternGenerator;

mod backend;
mod classify;
mod config;
mod engine;
mod frame;
mod pattern;

#[derive(Debug, Error)]
/// Errors that can arise while configuring or driving capture sessions.
pub enum CaptureError {
    #[error("failed to open video source {uri:?}: {reason}")]
    Open { uri: String, reason: String },
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),
    #[error("capture source {uri:?} is not supported ({kind})")]
    Unsupported { uri: String, kind: &'static str },
    #[error("invalid state for this operation: {0}")]
    InvalidState(String),
    #[error("stop_capture may not be called from the capture worker")]
    StopFromWorker,
    #[error("capture failed: {0}")]
    Capture(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
