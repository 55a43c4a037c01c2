//! Per-session capture engine.
//!
//! Each engine owns at most one worker thread running the capture loop:
//! pull a frame from the backend, validate it, update statistics, hand it to
//! the registered callback, then sleep to hold the configured framerate.
//! Transient source failures go through a bounded reconnect loop; exhausting
//! the budget parks the engine in the error state.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    backend::CaptureBackend,
    classify::classify_url,
    config::AtomicCameraState,
    CameraConfig, CameraState, CameraStats, CameraType, CaptureError, Frame,
};

/// Callback invoked on the capture worker for every validated frame.
///
/// Invocations are strictly serial and ordered by capture. Callbacks must be
/// non-blocking; panics are caught and logged, never propagated.
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync + 'static>;

type BackendOpener =
    Box<dyn Fn(CameraType, &str, &CameraConfig) -> Result<CaptureBackend, CaptureError> + Send + Sync>;

struct EngineShared {
    config: CameraConfig,
    last_error: Option<String>,
}

struct EngineCore {
    camera_url: String,
    camera_type: CameraType,
    state: AtomicCameraState,
    stats: Arc<CameraStats>,
    shared: Mutex<EngineShared>,
    callback: Mutex<Option<FrameCallback>>,
    backend: Mutex<Option<CaptureBackend>>,
    should_stop: AtomicBool,
    is_capturing: AtomicBool,
    reconnect_attempts: AtomicU32,
    opener: BackendOpener,
}

impl EngineCore {
    fn lock_shared(&self) -> MutexGuard<'_, EngineShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(url = %self.camera_url, "{message}");
        self.lock_shared().last_error = Some(message);
    }

    fn open_backend(&self) -> Result<CaptureBackend, CaptureError> {
        let config = self.lock_shared().config.clone();
        (self.opener)(self.camera_type, &self.camera_url, &config)
    }
}

/// Engine driving one capture session.
pub struct CaptureEngine {
    core: Arc<EngineCore>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CaptureEngine {
    /// Create an engine for the given source URL. The URL is classified
    /// immediately; initialisation happens in [`CaptureEngine::initialize`].
    pub fn new(camera_url: impl Into<String>) -> Self {
        Self::build(
            camera_url.into(),
            Box::new(|camera_type, url, config| CaptureBackend::open(camera_type, url, config)),
        )
    }

    #[cfg(test)]
    pub(crate) fn with_opener(camera_url: impl Into<String>, opener: BackendOpener) -> Self {
        Self::build(camera_url.into(), opener)
    }

    fn build(camera_url: String, opener: BackendOpener) -> Self {
        let camera_type = classify_url(&camera_url);
        Self {
            core: Arc::new(EngineCore {
                camera_url,
                camera_type,
                state: AtomicCameraState::new(CameraState::Uninitialized),
                stats: Arc::new(CameraStats::new()),
                shared: Mutex::new(EngineShared {
                    config: CameraConfig::default(),
                    last_error: None,
                }),
                callback: Mutex::new(None),
                backend: Mutex::new(None),
                should_stop: AtomicBool::new(false),
                is_capturing: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                opener,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Validate the configuration and open the source backend.
    ///
    /// Fails when already initialised or when the configuration is out of
    /// range; backend failures record the error and park the engine in the
    /// error state.
    pub fn initialize(&self, config: CameraConfig) -> Result<(), CaptureError> {
        if let Err(err) = config.validate() {
            self.core.set_error(err.to_string());
            self.core.state.store(CameraState::Error);
            return Err(err);
        }

        {
            let mut shared = self.core.lock_shared();
            if self.core.state.load() != CameraState::Uninitialized {
                let err = CaptureError::InvalidState("already initialized".to_string());
                shared.last_error = Some(err.to_string());
                return Err(err);
            }
            self.core.state.store(CameraState::Initializing);
            shared.config = config;
        }

        match self.core.open_backend() {
            Ok(backend) => {
                *self
                    .core
                    .backend
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(backend);
                self.core.reconnect_attempts.store(0, Ordering::SeqCst);
                self.core.state.store(CameraState::Ready);
                self.core.stats.mark_started();
                debug!(url = %self.core.camera_url, kind = self.core.camera_type.as_str(), "capture initialized");
                Ok(())
            }
            Err(err) => {
                self.core.set_error(err.to_string());
                self.core.state.store(CameraState::Error);
                Err(err)
            }
        }
    }

    /// Spawn the capture worker. Requires the ready state; calling while
    /// already capturing is a no-op.
    pub fn start_capture(&self) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if self.core.is_capturing.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.core.state.load() != CameraState::Ready {
            let err = CaptureError::InvalidState(format!(
                "camera not ready for capture (state: {})",
                self.core.state.load().as_str()
            ));
            self.core.set_error(err.to_string());
            return Err(err);
        }

        self.core.should_stop.store(false, Ordering::SeqCst);
        let core = Arc::clone(&self.core);
        let handle = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_loop(&core))
            .map_err(|err| CaptureError::Other(err.into()))?;

        self.core.is_capturing.store(true, Ordering::SeqCst);
        self.core.state.store(CameraState::Capturing);
        *worker = Some(handle);
        Ok(())
    }

    /// Signal the worker to stop and block until it exits.
    ///
    /// Idempotent when not capturing. Rejected when called from the capture
    /// worker itself, which would self-join.
    pub fn stop_capture(&self) -> Result<(), CaptureError> {
        if !self.core.is_capturing.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = worker.as_ref() {
                if handle.thread().id() == thread::current().id() {
                    return Err(CaptureError::StopFromWorker);
                }
            }
        }

        self.core.should_stop.store(true, Ordering::SeqCst);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(url = %self.core.camera_url, "capture worker panicked");
            }
        }

        self.core.is_capturing.store(false, Ordering::SeqCst);
        if self.core.state.load() == CameraState::Capturing {
            self.core.state.store(CameraState::Ready);
        }
        Ok(())
    }

    /// Stop capture, release the backend, clear the callback, and return to
    /// the uninitialised state. Runs on drop; errors are swallowed.
    pub fn cleanup(&self) {
        if let Err(err) = self.stop_capture() {
            warn!(url = %self.core.camera_url, "stop during cleanup failed: {err}");
        }
        *self
            .core
            .backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .core
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.core.state.store(CameraState::Uninitialized);
    }

    /// Install the frame callback, replacing any previous one.
    pub fn set_frame_callback(&self, callback: impl Fn(&Frame) + Send + Sync + 'static) {
        *self
            .core
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_frame_callback(&self) {
        *self
            .core
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn state(&self) -> CameraState {
        self.core.state.load()
    }

    /// Live statistics; counters are atomic and may be read at any time.
    pub fn stats(&self) -> &CameraStats {
        &self.core.stats
    }

    /// Shareable handle to the statistics, for callbacks that outlive a
    /// borrow of the engine.
    pub fn stats_handle(&self) -> Arc<CameraStats> {
        Arc::clone(&self.core.stats)
    }

    pub fn last_error(&self) -> Option<String> {
        self.core.lock_shared().last_error.clone()
    }

    pub fn camera_url(&self) -> &str {
        &self.core.camera_url
    }

    pub fn camera_type(&self) -> CameraType {
        self.core.camera_type
    }

    pub fn is_capturing(&self) -> bool {
        self.core.is_capturing.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), CameraState::Ready | CameraState::Capturing)
    }

    pub fn config(&self) -> CameraConfig {
        self.core.lock_shared().config.clone()
    }

    pub fn set_config(&self, config: CameraConfig) {
        self.core.lock_shared().config = config;
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn capture_loop(core: &EngineCore) {
    debug!(url = %core.camera_url, "capture loop started");

    while !core.should_stop.load(Ordering::SeqCst) {
        let captured = {
            let mut backend = core.backend.lock().unwrap_or_else(PoisonError::into_inner);
            match backend.as_mut() {
                Some(backend) => backend.capture_frame(),
                None => Err(CaptureError::Capture("no capture backend".to_string())),
            }
        };

        match captured {
            Ok(frame) if !frame.data.is_empty() => {
                // Test frames are valid by construction.
                if core.camera_type == CameraType::TestPattern || validate_frame(&frame) {
                    core.stats.record_frame(frame.data.len());
                    dispatch_frame(core, &frame);
                } else {
                    // Skipped frames do not count toward reconnect budget.
                    debug!(
                        url = %core.camera_url,
                        bytes = frame.data.len(),
                        "discarding invalid frame"
                    );
                }
            }
            Ok(_) => {
                if !run_reconnect(core) {
                    break;
                }
            }
            Err(err) => {
                debug!(url = %core.camera_url, "capture failed: {err}");
                if !run_reconnect(core) {
                    break;
                }
            }
        }

        let fps = core.lock_shared().config.fps;
        thread::sleep(Duration::from_millis(1000 / fps.max(1) as u64));
    }

    core.is_capturing.store(false, Ordering::SeqCst);
    debug!(url = %core.camera_url, "capture loop exited");
}

/// Loose frame check on the capture path; the processor applies the strict
/// per-format bound later.
fn validate_frame(frame: &Frame) -> bool {
    if frame.data.is_empty() || frame.width <= 0 || frame.height <= 0 {
        return false;
    }
    let expected_min = frame.width as usize * frame.height as usize;
    frame.data.len() >= expected_min / 2
}

fn dispatch_frame(core: &EngineCore, frame: &Frame) {
    // Snapshot under the slot lock, invoke outside it, so callbacks may call
    // back into engine accessors.
    let callback = core
        .callback
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(callback) = callback {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
            error!(url = %core.camera_url, "frame callback panicked");
        }
    }
}

/// Bounded reconnect loop. Returns `true` when capture resumed; `false`
/// parks the engine in the error state (or honours a stop request).
fn run_reconnect(core: &EngineCore) -> bool {
    loop {
        if core.should_stop.load(Ordering::SeqCst) {
            return false;
        }

        let (auto_reconnect, max_attempts, delay_ms) = {
            let shared = core.lock_shared();
            (
                shared.config.auto_reconnect,
                shared.config.max_reconnect_attempts,
                shared.config.reconnect_delay_ms,
            )
        };

        if !auto_reconnect {
            core.set_error("Capture failed and reconnect disabled");
            core.state.store(CameraState::Error);
            return false;
        }
        if core.reconnect_attempts.load(Ordering::SeqCst) >= max_attempts {
            core.set_error("Maximum reconnect attempts exceeded");
            core.state.store(CameraState::Error);
            return false;
        }

        core.state.store(CameraState::Disconnected);
        core.state.store(CameraState::Reconnecting);
        let attempt = core.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        core.stats.record_reconnect();
        info!(
            url = %core.camera_url,
            attempt,
            max_attempts,
            "reconnecting capture source"
        );

        thread::sleep(Duration::from_millis(delay_ms));

        match core.open_backend() {
            Ok(backend) => {
                *core.backend.lock().unwrap_or_else(PoisonError::into_inner) = Some(backend);
                core.reconnect_attempts.store(0, Ordering::SeqCst);
                core.state.store(CameraState::Capturing);
                info!(url = %core.camera_url, "reconnect successful");
                return true;
            }
            Err(err) => {
                core.set_error(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use crossbeam_channel::unbounded;

    use super::*;

    fn fast_config() -> CameraConfig {
        CameraConfig {
            width: 160,
            height: 120,
            fps: 100,
            ..CameraConfig::default()
        }
    }

    fn wait_for(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    #[test]
    fn invalid_config_leaves_error_state() {
        let engine = CaptureEngine::new("test://pattern");
        let config = CameraConfig {
            width: 0,
            ..CameraConfig::default()
        };
        assert!(engine.initialize(config).is_err());
        assert_eq!(engine.state(), CameraState::Error);
        assert!(engine.last_error().is_some());
    }

    #[test]
    fn overflowing_config_is_rejected() {
        let engine = CaptureEngine::new("test://pattern");
        let config = CameraConfig {
            width: 65_536,
            height: 65_536,
            ..CameraConfig::default()
        };
        assert!(engine.initialize(config).is_err());
        assert_eq!(engine.state(), CameraState::Error);
    }

    #[test]
    fn double_initialize_is_rejected() {
        let engine = CaptureEngine::new("test://pattern");
        engine.initialize(fast_config()).unwrap();
        assert_eq!(engine.state(), CameraState::Ready);
        assert!(engine.initialize(fast_config()).is_err());
        assert_eq!(engine.state(), CameraState::Ready);
    }

    #[test]
    fn unknown_source_fails_initialization() {
        let engine = CaptureEngine::new("not-a-camera");
        assert_eq!(engine.camera_type(), CameraType::Unknown);
        assert!(engine.initialize(fast_config()).is_err());
        assert_eq!(engine.state(), CameraState::Error);
    }

    #[test]
    fn start_without_initialize_is_rejected() {
        let engine = CaptureEngine::new("test://pattern");
        assert!(engine.start_capture().is_err());
        assert!(!engine.is_capturing());
    }

    #[test]
    fn test_pattern_lifecycle_produces_frames() {
        let engine = CaptureEngine::new("test://pattern");
        engine.initialize(fast_config()).unwrap();

        let (tx, rx) = unbounded();
        engine.set_frame_callback(move |frame| {
            let _ = tx.send(frame.data.len());
        });

        engine.start_capture().unwrap();
        assert!(engine.is_capturing());
        assert_eq!(engine.state(), CameraState::Capturing);
        // Duplicate start is a no-op.
        engine.start_capture().unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, 160 * 120 * 3);

        assert!(wait_for(
            || engine.stats().frames_captured.load(Ordering::Relaxed) >= 2,
            Duration::from_secs(2)
        ));
        assert!(engine.stats().bytes_received.load(Ordering::Relaxed) > 0);

        engine.stop_capture().unwrap();
        assert!(!engine.is_capturing());
        assert_eq!(engine.state(), CameraState::Ready);
        // Stop twice succeeds.
        engine.stop_capture().unwrap();

        engine.cleanup();
        assert_eq!(engine.state(), CameraState::Uninitialized);
    }

    #[test]
    fn frame_counters_are_monotonic() {
        let engine = CaptureEngine::new("test://pattern");
        engine.initialize(fast_config()).unwrap();
        engine.start_capture().unwrap();

        let mut last_frames = 0;
        let mut last_bytes = 0;
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(30));
            let frames = engine.stats().frames_captured.load(Ordering::Relaxed);
            let bytes = engine.stats().bytes_received.load(Ordering::Relaxed);
            assert!(frames >= last_frames);
            assert!(bytes >= last_bytes);
            last_frames = frames;
            last_bytes = bytes;
        }
        engine.stop_capture().unwrap();
    }

    #[test]
    fn stop_from_worker_thread_is_rejected() {
        let engine = Arc::new(CaptureEngine::new("test://pattern"));
        engine.initialize(fast_config()).unwrap();

        let (tx, rx) = unbounded();
        let worker_engine = Arc::clone(&engine);
        engine.set_frame_callback(move |_| {
            let rejected = matches!(
                worker_engine.stop_capture(),
                Err(CaptureError::StopFromWorker)
            );
            let _ = tx.send(rejected);
        });

        engine.start_capture().unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());

        engine.clear_frame_callback();
        engine.stop_capture().unwrap();
    }

    #[test]
    fn callback_panic_does_not_kill_the_worker() {
        let engine = CaptureEngine::new("test://pattern");
        engine.initialize(fast_config()).unwrap();
        engine.set_frame_callback(|_| panic!("misbehaving callback"));
        engine.start_capture().unwrap();

        assert!(wait_for(
            || engine.stats().frames_captured.load(Ordering::Relaxed) >= 3,
            Duration::from_secs(2)
        ));
        assert!(engine.is_capturing());
        engine.stop_capture().unwrap();
    }

    #[test]
    fn reconnect_budget_exhaustion_parks_in_error() {
        let opens = Arc::new(AtomicUsize::new(0));
        let opener_opens = Arc::clone(&opens);
        let engine = CaptureEngine::with_opener(
            "test://pattern",
            Box::new(move |_, _, _| {
                if opener_opens.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(CaptureBackend::Failing)
                } else {
                    Err(CaptureError::Capture("source still down".to_string()))
                }
            }),
        );

        let config = CameraConfig {
            fps: 200,
            reconnect_delay_ms: 1,
            max_reconnect_attempts: 3,
            ..CameraConfig::default()
        };
        engine.initialize(config).unwrap();
        engine.start_capture().unwrap();

        assert!(wait_for(
            || engine.state() == CameraState::Error,
            Duration::from_secs(5)
        ));
        assert!(wait_for(|| !engine.is_capturing(), Duration::from_secs(2)));
        assert_eq!(engine.stats().reconnect_count.load(Ordering::Relaxed), 3);
        assert!(engine
            .last_error()
            .unwrap()
            .contains("Maximum reconnect attempts exceeded"));
        // One initial open plus one per reconnect attempt.
        assert_eq!(opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn reconnect_disabled_fails_immediately() {
        let opens = Arc::new(AtomicUsize::new(0));
        let opener_opens = Arc::clone(&opens);
        let engine = CaptureEngine::with_opener(
            "test://pattern",
            Box::new(move |_, _, _| {
                opener_opens.fetch_add(1, Ordering::SeqCst);
                Ok(CaptureBackend::Failing)
            }),
        );

        let config = CameraConfig {
            fps: 200,
            auto_reconnect: false,
            ..CameraConfig::default()
        };
        engine.initialize(config).unwrap();
        engine.start_capture().unwrap();

        assert!(wait_for(
            || engine.state() == CameraState::Error,
            Duration::from_secs(2)
        ));
        assert_eq!(engine.stats().reconnect_count.load(Ordering::Relaxed), 0);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }
}
