//! The detector seam: a narrow capability set every frame analyzer
//! implements, and the detection records it produces.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use video_ingest::Frame;

/// Pixel-space bounding box of a detection.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Single detection reported for a frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    /// Unique within a session.
    pub id: String,
    /// Detection category, e.g. `"motion"`.
    pub kind: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub bbox: BoundingBox,
    pub metadata: HashMap<String, String>,
}

/// Per-frame analyzer. The registry owns detectors exclusively and calls
/// them from a single thread, so implementations may keep mutable state
/// (e.g. the previous frame) without internal locking.
pub trait Detector: Send {
    fn initialize(&mut self) -> Result<()>;
    fn cleanup(&mut self);
    /// Analyze one frame, returning zero or more detections.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
    fn name(&self) -> &str;
}
