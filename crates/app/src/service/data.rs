//! Wire types for the RPC surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct StartStreamRequest {
    pub camera_id: String,
    pub camera_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopStreamRequest {
    pub camera_id: String,
}

/// Response body for start/stop operations. Admission failures ride on a
/// successful RPC with `status = "error"`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
}

impl StreamResponse {
    pub fn success(message: impl Into<String>, stream_id: Option<String>) -> Self {
        Self {
            status: crate::service::registry::STATUS_SUCCESS.to_string(),
            message: message.into(),
            stream_id,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: crate::service::registry::STATUS_ERROR.to_string(),
            message: message.into(),
            stream_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamStats {
    pub frames_processed: i64,
    pub detections_count: i64,
    pub fps_actual: f64,
    pub uptime_seconds: u64,
    pub last_frame_timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub camera_id: String,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StreamStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub active_streams: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameRequest {
    pub camera_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub processing_time_ms: i64,
    pub detections_count: i64,
    pub cpu_usage: f32,
    pub memory_usage_mb: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameResponse {
    pub camera_id: String,
    pub timestamp: i64,
    pub processing_stats: ProcessingStats,
}
