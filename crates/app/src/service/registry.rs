//! Session registry: the concurrency-safe index of active capture sessions.
//!
//! All structural mutation and status/health reads serialize through one
//! mutex; admission check and insertion are a single critical section. Each
//! admitted session owns a capture engine plus a processing worker wired to
//! it by a bounded frame channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, TrySendError};
use detect_core::FrameProcessor;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use video_ingest::{
    classify_url, CameraConfig, CameraState, CameraType, CaptureEngine, Frame,
};

use crate::service::config::{CAPACITY_WARN_RATIO, MAX_CONCURRENT_STREAMS, SERVICE_VERSION};
use crate::service::data::{HealthResponse, StatusResponse, StreamResponse, StreamStats};
use crate::service::telemetry;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_STARTING: &str = "starting";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_STOPPING: &str = "stopping";
pub const STATUS_STOPPED: &str = "stopped";

pub const HEALTH_HEALTHY: &str = "healthy";
pub const HEALTH_DEGRADED: &str = "degraded";
pub const HEALTH_UNHEALTHY: &str = "unhealthy";

#[derive(Debug, Error)]
/// Validation failures reported as invalid-argument RPC errors. They never
/// mutate registry state.
pub enum RequestError {
    #[error("{0}")]
    InvalidArgument(String),
}

struct StreamSession {
    camera_url: String,
    status: String,
    started: Instant,
    frames_processed: Arc<AtomicI64>,
    detections_count: Arc<AtomicI64>,
    engine: CaptureEngine,
    worker: Option<thread::JoinHandle<()>>,
}

impl StreamSession {
    /// Status as reported to callers; an errored engine overrides the
    /// stored lifecycle status.
    fn effective_status(&self) -> &str {
        if self.engine.state() == CameraState::Error {
            STATUS_ERROR
        } else {
            &self.status
        }
    }
}

/// Process-global index of active sessions.
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, StreamSession>>,
    started: Instant,
    total_streams_started: AtomicI64,
    total_frames_processed: AtomicI64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            started: Instant::now(),
            total_streams_started: AtomicI64::new(0),
            total_frames_processed: AtomicI64::new(0),
        }
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<String, StreamSession>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a new capture session for `camera_id`.
    pub fn start_stream(
        &self,
        camera_id: &str,
        camera_url: &str,
    ) -> Result<StreamResponse, RequestError> {
        if camera_id.is_empty() {
            return Err(RequestError::InvalidArgument(
                "camera ID cannot be empty".to_string(),
            ));
        }
        if camera_url.is_empty() {
            return Err(RequestError::InvalidArgument(
                "camera URL cannot be empty".to_string(),
            ));
        }
        if classify_url(camera_url) == CameraType::Unknown {
            return Err(RequestError::InvalidArgument(format!(
                "invalid camera URL format: {camera_url}"
            )));
        }

        let mut streams = self.lock_streams();

        if streams.contains_key(camera_id) {
            warn!(camera_id, "rejecting duplicate stream");
            return Ok(StreamResponse::error(format!(
                "Stream already active for camera {camera_id}"
            )));
        }
        if streams.len() >= MAX_CONCURRENT_STREAMS {
            warn!(camera_id, "rejecting stream, concurrency cap reached");
            return Ok(StreamResponse::error(
                "Maximum number of concurrent streams reached",
            ));
        }

        let session = match build_session(camera_id, camera_url) {
            Ok(session) => session,
            Err(err) => {
                error!(camera_id, "failed to start stream: {err:#}");
                return Ok(StreamResponse::error(format!(
                    "Failed to start stream for camera {camera_id}: {err}"
                )));
            }
        };

        let stream_id = format!("{camera_id}_{}", Utc::now().timestamp_millis());
        streams.insert(camera_id.to_string(), session);
        self.total_streams_started.fetch_add(1, Ordering::Relaxed);
        telemetry::record_stream_started();
        info!(camera_id, stream_id, "stream started");

        Ok(StreamResponse::success(
            "Stream started successfully",
            Some(stream_id),
        ))
    }

    /// Stop and remove the session for `camera_id`.
    pub fn stop_stream(&self, camera_id: &str) -> Result<StreamResponse, RequestError> {
        if camera_id.is_empty() {
            return Err(RequestError::InvalidArgument(
                "camera ID cannot be empty".to_string(),
            ));
        }

        let mut streams = self.lock_streams();
        let Some(mut session) = streams.remove(camera_id) else {
            return Ok(StreamResponse::error(format!(
                "No active stream found for camera {camera_id}"
            )));
        };

        session.status = STATUS_STOPPING.to_string();
        teardown_session(camera_id, &mut session);
        info!(camera_id, url = %session.camera_url, "stream stopped");

        Ok(StreamResponse::success("Stream stopped successfully", None))
    }

    /// Report the status of a session; absent sessions read as stopped.
    pub fn stream_status(&self, camera_id: &str) -> Result<StatusResponse, RequestError> {
        if camera_id.is_empty() {
            return Err(RequestError::InvalidArgument(
                "camera ID cannot be empty".to_string(),
            ));
        }

        let streams = self.lock_streams();
        let Some(session) = streams.get(camera_id) else {
            return Ok(StatusResponse {
                camera_id: camera_id.to_string(),
                status: STATUS_STOPPED.to_string(),
                message: "No active stream".to_string(),
                stats: None,
            });
        };

        let uptime = session.started.elapsed().as_secs();
        let frames = session.frames_processed.load(Ordering::Relaxed);
        Ok(StatusResponse {
            camera_id: camera_id.to_string(),
            status: session.effective_status().to_string(),
            message: "Stream active".to_string(),
            stats: Some(StreamStats {
                frames_processed: frames,
                detections_count: session.detections_count.load(Ordering::Relaxed),
                fps_actual: frames as f64 / uptime.max(1) as f64,
                uptime_seconds: uptime,
                last_frame_timestamp: Utc::now().timestamp(),
            }),
        })
    }

    /// Service health: healthy unless a session errored or the registry is
    /// close to the admission cap.
    pub fn health(&self) -> HealthResponse {
        let (active, any_error) = {
            let streams = self.lock_streams();
            let any_error = streams
                .values()
                .any(|session| session.effective_status() == STATUS_ERROR);
            (streams.len(), any_error)
        };

        let mut status = HEALTH_HEALTHY;
        let mut message = "Service is healthy".to_string();
        if any_error {
            status = HEALTH_DEGRADED;
            message = "One or more streams in error state".to_string();
        }
        if active as f64 >= MAX_CONCURRENT_STREAMS as f64 * CAPACITY_WARN_RATIO {
            status = HEALTH_DEGRADED;
            message = "Approaching maximum concurrent streams".to_string();
        }

        HealthResponse {
            status: status.to_string(),
            message,
            active_streams: active,
            uptime_seconds: self.started.elapsed().as_secs(),
            version: SERVICE_VERSION.to_string(),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.lock_streams().len()
    }

    /// Bump the frame counter shared with the bidirectional frame stream.
    pub fn record_processed_frame(&self) {
        self.total_frames_processed.fetch_add(1, Ordering::Relaxed);
        telemetry::record_frames_processed(1);
    }

    pub fn total_frames_processed(&self) -> i64 {
        self.total_frames_processed.load(Ordering::Relaxed)
    }

    pub fn total_streams_started(&self) -> i64 {
        self.total_streams_started.load(Ordering::Relaxed)
    }

    /// Stop every session. Errors are logged and swallowed.
    pub fn shutdown(&self) {
        let mut streams = self.lock_streams();
        for (camera_id, mut session) in streams.drain() {
            info!(camera_id, "stopping stream for shutdown");
            session.status = STATUS_STOPPING.to_string();
            teardown_session(&camera_id, &mut session);
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct the engine/processor pair for one session and start capture.
fn build_session(camera_id: &str, camera_url: &str) -> anyhow::Result<StreamSession> {
    let engine = CaptureEngine::new(camera_url);
    let config = CameraConfig::default();
    let buffer_size = config.frame_buffer_size;
    engine.initialize(config)?;

    let (frame_tx, frame_rx) = bounded::<Frame>(buffer_size);
    let stats = engine.stats_handle();
    engine.set_frame_callback(move |frame| match frame_tx.try_send(frame.clone()) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => stats.record_drop(),
        Err(TrySendError::Disconnected(_)) => {}
    });

    let frames_processed = Arc::new(AtomicI64::new(0));
    let detections_count = Arc::new(AtomicI64::new(0));
    let worker = spawn_processing_worker(
        camera_id.to_string(),
        frame_rx,
        Arc::clone(&frames_processed),
        Arc::clone(&detections_count),
    )?;

    if let Err(err) = engine.start_capture() {
        // Disconnect the worker before bailing so it drains and exits.
        engine.clear_frame_callback();
        let _ = worker.join();
        return Err(err.into());
    }

    Ok(StreamSession {
        camera_url: camera_url.to_string(),
        status: STATUS_ACTIVE.to_string(),
        started: Instant::now(),
        frames_processed,
        detections_count,
        engine,
        worker: Some(worker),
    })
}

fn spawn_processing_worker(
    camera_id: String,
    frames: Receiver<Frame>,
    frames_processed: Arc<AtomicI64>,
    detections_count: Arc<AtomicI64>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("frame-processor-{camera_id}"))
        .spawn(move || {
            let mut processor = FrameProcessor::new();
            if let Err(err) = processor.initialize() {
                error!(camera_id, "frame processor failed to initialize: {err:#}");
                return;
            }

            while let Ok(frame) = frames.recv() {
                let result = processor.process_frame(&frame);
                if result.success {
                    frames_processed.fetch_add(1, Ordering::Relaxed);
                    detections_count.fetch_add(result.detections.len() as i64, Ordering::Relaxed);
                    telemetry::record_frames_processed(1);
                    telemetry::record_detections(result.detections.len() as u64);
                    telemetry::record_processing_time_ms(result.processing_time_ms);
                } else if let Some(message) = result.error_message {
                    debug!(camera_id, "frame rejected: {message}");
                }
            }
            debug!(camera_id, "processing worker drained");
        })
}

fn teardown_session(camera_id: &str, session: &mut StreamSession) {
    if let Err(err) = session.engine.stop_capture() {
        warn!(camera_id, "stop capture failed: {err}");
    }
    // Dropping the callback disconnects the frame channel; the processing
    // worker drains whatever is queued and exits.
    session.engine.clear_frame_callback();
    if let Some(worker) = session.worker.take() {
        if worker.join().is_err() {
            error!(camera_id, "processing worker panicked");
        }
    }
    session.engine.cleanup();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const PATTERN_URL: &str = "test://pattern";

    #[test]
    fn health_is_healthy_by_default() {
        let registry = StreamRegistry::new();
        let health = registry.health();
        assert_eq!(health.status, HEALTH_HEALTHY);
        assert_eq!(health.active_streams, 0);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn start_stream_with_valid_request() {
        let registry = StreamRegistry::new();
        let response = registry.start_stream("cam1", PATTERN_URL).unwrap();

        assert_eq!(response.status, STATUS_SUCCESS);
        assert!(response.stream_id.as_deref().unwrap().starts_with("cam1_"));
        assert_eq!(registry.active_streams(), 1);
        assert_eq!(registry.total_streams_started(), 1);

        registry.stop_stream("cam1").unwrap();
    }

    #[test]
    fn duplicate_stream_is_an_in_body_error() {
        let registry = StreamRegistry::new();
        let first = registry.start_stream("cam1", PATTERN_URL).unwrap();
        assert_eq!(first.status, STATUS_SUCCESS);

        let second = registry.start_stream("cam1", PATTERN_URL).unwrap();
        assert_eq!(second.status, STATUS_ERROR);
        assert_eq!(registry.active_streams(), 1);

        registry.stop_stream("cam1").unwrap();
    }

    #[test]
    fn empty_fields_are_invalid_arguments() {
        let registry = StreamRegistry::new();
        assert!(matches!(
            registry.start_stream("", PATTERN_URL),
            Err(RequestError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.start_stream("cam1", ""),
            Err(RequestError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.stop_stream(""),
            Err(RequestError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.stream_status(""),
            Err(RequestError::InvalidArgument(_))
        ));
        assert_eq!(registry.active_streams(), 0);
    }

    #[test]
    fn unclassifiable_url_is_an_invalid_argument() {
        let registry = StreamRegistry::new();
        assert!(matches!(
            registry.start_stream("cam1", "not-a-url"),
            Err(RequestError::InvalidArgument(_))
        ));
        assert_eq!(registry.active_streams(), 0);
    }

    #[test]
    fn stop_missing_stream_is_an_in_body_error() {
        let registry = StreamRegistry::new();
        let response = registry.stop_stream("nonexistent").unwrap();
        assert_eq!(response.status, STATUS_ERROR);
    }

    #[test]
    fn status_of_absent_stream_reads_stopped() {
        let registry = StreamRegistry::new();
        let status = registry.stream_status("inactive").unwrap();
        assert_eq!(status.camera_id, "inactive");
        assert_eq!(status.status, STATUS_STOPPED);
        assert!(status.stats.is_none());
    }

    #[test]
    fn active_stream_reports_processing_stats() {
        let registry = StreamRegistry::new();
        registry.start_stream("cam1", PATTERN_URL).unwrap();

        std::thread::sleep(Duration::from_millis(300));

        let status = registry.stream_status("cam1").unwrap();
        assert_eq!(status.status, STATUS_ACTIVE);
        let stats = status.stats.unwrap();
        assert!(stats.frames_processed > 0);
        assert!(stats.fps_actual > 0.0);
        assert!(stats.last_frame_timestamp > 0);

        let stop = registry.stop_stream("cam1").unwrap();
        assert_eq!(stop.status, STATUS_SUCCESS);
        assert_eq!(registry.active_streams(), 0);

        let after = registry.stream_status("cam1").unwrap();
        assert_eq!(after.status, STATUS_STOPPED);
    }

    #[test]
    fn stop_then_restart_reuses_the_camera_id() {
        let registry = StreamRegistry::new();
        assert_eq!(
            registry.start_stream("cam1", PATTERN_URL).unwrap().status,
            STATUS_SUCCESS
        );
        assert_eq!(registry.stop_stream("cam1").unwrap().status, STATUS_SUCCESS);
        assert_eq!(
            registry.start_stream("cam1", PATTERN_URL).unwrap().status,
            STATUS_SUCCESS
        );
        assert_eq!(registry.active_streams(), 1);
        registry.shutdown();
        assert_eq!(registry.active_streams(), 0);
    }

    #[test]
    fn admission_cap_and_capacity_degradation() {
        let registry = StreamRegistry::new();
        for i in 0..MAX_CONCURRENT_STREAMS {
            let response = registry.start_stream(&format!("cam{i}"), PATTERN_URL).unwrap();
            assert_eq!(response.status, STATUS_SUCCESS, "stream {i}");
        }
        assert_eq!(registry.active_streams(), MAX_CONCURRENT_STREAMS);

        let over_cap = registry.start_stream("one-too-many", PATTERN_URL).unwrap();
        assert_eq!(over_cap.status, STATUS_ERROR);
        assert_eq!(registry.active_streams(), MAX_CONCURRENT_STREAMS);

        let health = registry.health();
        assert_eq!(health.status, HEALTH_DEGRADED);
        assert_eq!(health.active_streams, MAX_CONCURRENT_STREAMS);

        registry.shutdown();
        assert_eq!(registry.active_streams(), 0);
        assert_eq!(registry.health().status, HEALTH_HEALTHY);
    }

    #[test]
    fn process_frames_counter_accumulates() {
        let registry = StreamRegistry::new();
        registry.record_processed_frame();
        registry.record_processed_frame();
        assert_eq!(registry.total_frames_processed(), 2);
    }
}
