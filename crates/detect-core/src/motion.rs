//! Reference motion detector.
//!
//! Deliberately synthetic: it compares frame sizes and rolls a die instead
//! of running real computer vision, but produces detections with the exact
//! shape downstream consumers see from a real detector.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use video_ingest::Frame;

use crate::detector::{BoundingBox, Detection, Detector};

/// Probability that an unchanged frame still reports simulated motion.
const MOTION_PROBABILITY: f64 = 0.3;

/// Simulated motion detector holding the previous frame for comparison.
pub struct BasicMotionDetector {
    initialized: bool,
    previous: Option<Frame>,
    counter: i64,
}

impl BasicMotionDetector {
    pub fn new() -> Self {
        Self {
            initialized: false,
            previous: None,
            counter: 0,
        }
    }

    fn has_significant_change(&self, current: &Frame, previous: &Frame) -> bool {
        if current.data.len() != previous.data.len() {
            return true;
        }
        rand::thread_rng().gen::<f64>() < MOTION_PROBABILITY
    }

    fn motion_detection(&self, x: i32, y: i32, width: i32, height: i32, confidence: f32) -> Detection {
        let mut metadata = HashMap::new();
        metadata.insert("detector".to_string(), self.name().to_string());
        metadata.insert("algorithm".to_string(), "simulated".to_string());
        metadata.insert("confidence_str".to_string(), confidence.to_string());

        Detection {
            id: format!("motion_{}_{}", Utc::now().timestamp_micros(), self.counter),
            kind: "motion".to_string(),
            confidence,
            timestamp_ms: Utc::now().timestamp_millis(),
            bbox: BoundingBox {
                x,
                y,
                width,
                height,
            },
            metadata,
        }
    }
}

impl Default for BasicMotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for BasicMotionDetector {
    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        self.counter = 0;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.initialized = false;
        self.previous = None;
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !self.initialized {
            return Ok(Vec::new());
        }

        let Some(previous) = self.previous.take() else {
            // First frame only seeds the comparison.
            self.previous = Some(frame.clone());
            return Ok(Vec::new());
        };

        let mut detections = Vec::new();
        if self.has_significant_change(frame, &previous) {
            let n = self.counter;
            let x = 100 + (n % 400) as i32;
            let y = 100 + ((n / 10) % 200) as i32;
            let width = 80 + (n % 40) as i32;
            let height = 60 + (n % 30) as i32;
            let confidence = 0.7 + rand::thread_rng().gen::<f32>() * 0.3;

            detections.push(self.motion_detection(x, y, width, height, confidence));
            self.counter += 1;
        }

        self.previous = Some(frame.clone());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "BasicMotionDetector"
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameFormat;

    use super::*;

    fn frame(width: i32, height: i32) -> Frame {
        Frame::test_frame(width, height, FrameFormat::Bgr)
    }

    #[test]
    fn first_frame_reports_nothing() {
        let mut detector = BasicMotionDetector::new();
        detector.initialize().unwrap();
        let detections = detector.detect(&frame(64, 64)).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn uninitialized_detector_is_silent() {
        let mut detector = BasicMotionDetector::new();
        assert!(detector.detect(&frame(64, 64)).unwrap().is_empty());
        assert!(detector.detect(&frame(128, 128)).unwrap().is_empty());
    }

    #[test]
    fn size_change_always_fires() {
        let mut detector = BasicMotionDetector::new();
        detector.initialize().unwrap();

        detector.detect(&frame(64, 64)).unwrap();
        let detections = detector.detect(&frame(128, 128)).unwrap();
        assert_eq!(detections.len(), 1);

        let detection = &detections[0];
        assert!(detection.id.starts_with("motion_"));
        assert_eq!(detection.kind, "motion");
        assert!((0.7..=1.0).contains(&detection.confidence));
        assert!(detection.timestamp_ms > 0);
        // Counter was 0 for the first reported detection.
        assert_eq!(detection.bbox.x, 100);
        assert_eq!(detection.bbox.y, 100);
        assert_eq!(detection.bbox.width, 80);
        assert_eq!(detection.bbox.height, 60);
        assert_eq!(detection.metadata.get("algorithm").unwrap(), "simulated");
    }

    #[test]
    fn counter_advances_per_reported_detection() {
        let mut detector = BasicMotionDetector::new();
        detector.initialize().unwrap();

        detector.detect(&frame(64, 64)).unwrap();
        detector.detect(&frame(128, 128)).unwrap();
        let second = detector.detect(&frame(64, 64)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].bbox.x, 101);
        assert_eq!(second[0].bbox.width, 81);
        assert_eq!(second[0].bbox.height, 61);
        assert!(second[0].id.ends_with("_1"));
    }

    #[test]
    fn cleanup_resets_previous_frame() {
        let mut detector = BasicMotionDetector::new();
        detector.initialize().unwrap();
        detector.detect(&frame(64, 64)).unwrap();

        detector.cleanup();
        detector.initialize().unwrap();
        // First frame after cleanup seeds again and reports nothing.
        assert!(detector.detect(&frame(64, 64)).unwrap().is_empty());
    }
}
