//! Tracing and metrics bootstrap.
//!
//! The Prometheus recorder is process-long state constructed lazily on first
//! use and never torn down; counters are atomic writes, reads are snapshots
//! rendered by the `/metrics` endpoint.

use std::{sync::OnceLock, thread, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, prelude::*};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

/// Install the tracing subscriber stack. Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init();
}

/// Ensure the global metrics recorder is installed and return its handle.
pub fn init_metrics_recorder() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("metrics recorder already installed; keeping the existing one");
        }

        let upkeep_handle = handle.clone();
        PROM_UPKEEP_THREAD.get_or_init(|| {
            thread::Builder::new()
                .name("prometheus-upkeep".into())
                .spawn(move || loop {
                    thread::sleep(Duration::from_secs(5));
                    upkeep_handle.run_upkeep();
                })
                .expect("failed to spawn prometheus upkeep thread")
        });

        handle
    })
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

pub fn record_stream_started() {
    metrics::counter!("vision_streams_started_total").increment(1);
}

pub fn record_frames_processed(count: u64) {
    metrics::counter!("vision_frames_processed_total").increment(count);
}

pub fn record_detections(count: u64) {
    if count > 0 {
        metrics::counter!("vision_detections_total").increment(count);
    }
}

pub fn record_processing_time_ms(time_ms: i64) {
    metrics::histogram!("vision_processing_time_ms").record(time_ms as f64);
}
