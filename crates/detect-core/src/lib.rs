//! Frame analysis for the vision ingest service: the detector seam, the
//! reference motion detector, and the frame processor that fans a validated
//! frame out to every registered detector.

pub use detector::{BoundingBox, Detection, Detector};
pub use motion::BasicMotionDetector;
pub use processor::{FrameProcessor, ProcessingResult};

mod detector;
mod motion;
mod processor;
