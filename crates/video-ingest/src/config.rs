//! Capture configuration, state machine, and per-session statistics.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use chrono::Utc;

use crate::{CaptureError, FrameFormat};

#[derive(Clone, Debug)]
/// Configuration applied when a capture session is initialised.
pub struct CameraConfig {
    pub width: i32,
    pub height: i32,
    pub fps: i32,
    pub format: FrameFormat,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Capacity of the frame hand-off buffer between the capture worker and
    /// downstream processing.
    pub frame_buffer_size: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            format: FrameFormat::Bgr,
            auto_reconnect: true,
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 3,
            frame_buffer_size: 30,
        }
    }
}

impl CameraConfig {
    /// Reject non-positive geometry/framerate and an overflowing pixel count.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width <= 0 || self.height <= 0 || self.fps <= 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "width, height, and fps must be positive (got {}x{} @ {} fps)",
                self.width, self.height, self.fps
            )));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(CaptureError::InvalidConfig(format!(
                "pixel count {}x{} overflows",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
/// Lifecycle state of a capture session.
pub enum CameraState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Capturing = 3,
    Error = 4,
    Disconnected = 5,
    Reconnecting = 6,
}

impl CameraState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CameraState::Initializing,
            2 => CameraState::Ready,
            3 => CameraState::Capturing,
            4 => CameraState::Error,
            5 => CameraState::Disconnected,
            6 => CameraState::Reconnecting,
            _ => CameraState::Uninitialized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraState::Uninitialized => "uninitialized",
            CameraState::Initializing => "initializing",
            CameraState::Ready => "ready",
            CameraState::Capturing => "capturing",
            CameraState::Error => "error",
            CameraState::Disconnected => "disconnected",
            CameraState::Reconnecting => "reconnecting",
        }
    }
}

/// Atomic cell holding a [`CameraState`], readable from any thread.
pub(crate) struct AtomicCameraState(AtomicU8);

impl AtomicCameraState {
    pub(crate) fn new(state: CameraState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> CameraState {
        CameraState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: CameraState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Live statistics for one capture session. Counters are atomic and safe to
/// read from any thread without holding the engine lock.
pub struct CameraStats {
    pub frames_captured: AtomicI64,
    pub frames_dropped: AtomicI64,
    pub bytes_received: AtomicI64,
    pub reconnect_count: AtomicI64,
    start_time_ms: AtomicI64,
    last_frame_ms: AtomicI64,
}

impl CameraStats {
    pub(crate) fn new() -> Self {
        Self {
            frames_captured: AtomicI64::new(0),
            frames_dropped: AtomicI64::new(0),
            bytes_received: AtomicI64::new(0),
            reconnect_count: AtomicI64::new(0),
            start_time_ms: AtomicI64::new(0),
            last_frame_ms: AtomicI64::new(0),
        }
    }

    pub(crate) fn mark_started(&self) {
        self.start_time_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self, byte_len: usize) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(byte_len as i64, Ordering::Relaxed);
        self.last_frame_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Count a frame dropped before processing (downstream backlog).
    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the session was initialised, zero before that.
    pub fn uptime_seconds(&self) -> f64 {
        let start = self.start_time_ms.load(Ordering::Relaxed);
        if start == 0 {
            return 0.0;
        }
        let elapsed_ms = Utc::now().timestamp_millis().saturating_sub(start);
        elapsed_ms.max(0) as f64 / 1000.0
    }

    /// Average captured frames per second over the session lifetime.
    pub fn fps_actual(&self) -> f64 {
        let uptime = self.uptime_seconds().floor() as i64;
        self.frames_captured.load(Ordering::Relaxed) as f64 / uptime.max(1) as f64
    }

    /// Milliseconds-since-epoch of the last validated frame, zero if none.
    pub fn last_frame_timestamp_ms(&self) -> i64 {
        self.last_frame_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CameraConfig::default().validate().is_ok());
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        for (w, h, fps) in [(0, 480, 15), (640, -1, 15), (640, 480, 0)] {
            let config = CameraConfig {
                width: w,
                height: h,
                fps,
                ..CameraConfig::default()
            };
            assert!(config.validate().is_err(), "{w}x{h}@{fps} should fail");
        }
    }

    #[test]
    fn overflowing_pixel_count_is_rejected() {
        let config = CameraConfig {
            width: 65_536,
            height: 65_536,
            ..CameraConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stats_counters_accumulate() {
        let stats = CameraStats::new();
        stats.mark_started();
        stats.record_frame(1000);
        stats.record_frame(500);
        stats.record_drop();
        stats.record_reconnect();

        assert_eq!(stats.frames_captured.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes_received.load(Ordering::Relaxed), 1500);
        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.reconnect_count.load(Ordering::Relaxed), 1);
        assert!(stats.last_frame_timestamp_ms() > 0);
        assert!(stats.fps_actual() > 0.0);
    }

    #[test]
    fn state_round_trips_through_atomic_cell() {
        let cell = AtomicCameraState::new(CameraState::Uninitialized);
        for state in [
            CameraState::Initializing,
            CameraState::Ready,
            CameraState::Capturing,
            CameraState::Error,
            CameraState::Disconnected,
            CameraState::Reconnecting,
            CameraState::Uninitialized,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }
}
