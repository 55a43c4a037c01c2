//! Frame processor: validates frames and fans them out to the detector
//! registry, with a per-frame detection cap and rolling latency statistics.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use tracing::debug;
use video_ingest::{expected_frame_size, Frame};

use crate::detector::{Detection, Detector};
use crate::motion::BasicMotionDetector;

pub const DEFAULT_MOTION_THRESHOLD: f64 = 0.1;
pub const DEFAULT_MIN_AREA: i32 = 100;
pub const DEFAULT_MAX_DETECTIONS: usize = 10;
pub const MIN_FRAME_DIM: i32 = 32;
pub const MAX_FRAME_DIM: i32 = 4096;

/// Outcome of processing a single frame.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub detections: Vec<Detection>,
    pub processing_time_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ProcessingResult {
    fn error(message: impl Into<String>) -> Self {
        Self {
            detections: Vec::new(),
            processing_time_ms: 0,
            success: false,
            error_message: Some(message.into()),
        }
    }
}

/// Owns the detector registry and aggregates processing statistics.
///
/// Detectors run in insertion order; output is capped at
/// `max_detections_per_frame` per frame.
pub struct FrameProcessor {
    detectors: Vec<Box<dyn Detector>>,
    initialized: bool,

    total_frames_processed: AtomicI64,
    total_detections: AtomicI64,
    total_processing_time_ms: AtomicI64,

    motion_threshold: f64,
    min_detection_area: i32,
    max_detections_per_frame: usize,
}

impl FrameProcessor {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            initialized: false,
            total_frames_processed: AtomicI64::new(0),
            total_detections: AtomicI64::new(0),
            total_processing_time_ms: AtomicI64::new(0),
            motion_threshold: DEFAULT_MOTION_THRESHOLD,
            min_detection_area: DEFAULT_MIN_AREA,
            max_detections_per_frame: DEFAULT_MAX_DETECTIONS,
        }
    }

    /// Register the default motion detector. Idempotent.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        if self.initialized {
            return Ok(());
        }

        let mut motion = Box::new(BasicMotionDetector::new());
        motion.initialize()?;
        self.detectors.push(motion);

        self.initialized = true;
        Ok(())
    }

    pub fn cleanup(&mut self) {
        for detector in &mut self.detectors {
            detector.cleanup();
        }
        self.detectors.clear();
        self.initialized = false;
    }

    /// Run every registered detector over a validated frame.
    pub fn process_frame(&mut self, frame: &Frame) -> ProcessingResult {
        let start = Instant::now();

        if !self.initialized {
            return ProcessingResult::error("frame processor not initialized");
        }
        if let Err(reason) = self.validate_frame(frame) {
            return ProcessingResult::error(reason);
        }

        let mut result = ProcessingResult {
            success: true,
            ..ProcessingResult::default()
        };

        'detectors: for detector in &mut self.detectors {
            match detector.detect(frame) {
                Ok(detections) => {
                    for detection in detections {
                        if result.detections.len() >= self.max_detections_per_frame {
                            break 'detectors;
                        }
                        result.detections.push(detection);
                    }
                }
                Err(err) => {
                    debug!("detector {} failed: {err}", detector.name());
                    result = ProcessingResult::error(format!(
                        "detector {} failed: {err}",
                        detector.name()
                    ));
                    break;
                }
            }
        }

        result.processing_time_ms = start.elapsed().as_millis() as i64;
        self.update_statistics(result.processing_time_ms, result.detections.len());
        result
    }

    /// Convenience wrapper building a frame from raw parts first.
    pub fn process_raw(
        &mut self,
        data: Vec<u8>,
        width: i32,
        height: i32,
        format: video_ingest::FrameFormat,
    ) -> ProcessingResult {
        let frame = Frame::new(data, width, height, format);
        self.process_frame(&frame)
    }

    /// Initialize and register a detector; one that fails to initialize is
    /// silently dropped.
    pub fn add_detector(&mut self, mut detector: Box<dyn Detector>) {
        match detector.initialize() {
            Ok(()) => self.detectors.push(detector),
            Err(err) => debug!("dropping detector {}: {err}", detector.name()),
        }
    }

    /// Remove every detector with the given name.
    pub fn remove_detector(&mut self, name: &str) {
        self.detectors.retain_mut(|detector| {
            if detector.name() == name {
                detector.cleanup();
                false
            } else {
                true
            }
        });
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors
            .iter()
            .map(|detector| detector.name().to_string())
            .collect()
    }

    pub fn set_motion_threshold(&mut self, threshold: f64) {
        self.motion_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn set_min_detection_area(&mut self, area: i32) {
        self.min_detection_area = area.max(1);
    }

    pub fn set_max_detections_per_frame(&mut self, max_detections: usize) {
        self.max_detections_per_frame = max_detections.max(1);
    }

    pub fn motion_threshold(&self) -> f64 {
        self.motion_threshold
    }

    pub fn min_detection_area(&self) -> i32 {
        self.min_detection_area
    }

    pub fn total_frames_processed(&self) -> i64 {
        self.total_frames_processed.load(Ordering::Relaxed)
    }

    pub fn total_detections(&self) -> i64 {
        self.total_detections.load(Ordering::Relaxed)
    }

    pub fn average_processing_time_ms(&self) -> f64 {
        let frames = self.total_frames_processed();
        if frames == 0 {
            return 0.0;
        }
        self.total_processing_time_ms.load(Ordering::Relaxed) as f64 / frames as f64
    }

    fn validate_frame(&self, frame: &Frame) -> Result<(), String> {
        if frame.data.is_empty() {
            return Err("frame data is empty".to_string());
        }
        if frame.width < MIN_FRAME_DIM
            || frame.width > MAX_FRAME_DIM
            || frame.height < MIN_FRAME_DIM
            || frame.height > MAX_FRAME_DIM
        {
            return Err(format!(
                "frame dimensions {}x{} outside [{MIN_FRAME_DIM}, {MAX_FRAME_DIM}]",
                frame.width, frame.height
            ));
        }

        let expected = expected_frame_size(frame.width, frame.height, frame.format);
        if expected > 0 && frame.data.len() * 10 < expected * 8 {
            return Err(format!(
                "frame holds {} bytes, expected at least 80% of {expected}",
                frame.data.len()
            ));
        }
        Ok(())
    }

    fn update_statistics(&self, processing_time_ms: i64, detections: usize) {
        self.total_frames_processed.fetch_add(1, Ordering::Relaxed);
        self.total_detections
            .fetch_add(detections as i64, Ordering::Relaxed);
        self.total_processing_time_ms
            .fetch_add(processing_time_ms, Ordering::Relaxed);
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}
