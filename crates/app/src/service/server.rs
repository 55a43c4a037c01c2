//! RPC surface served over HTTP.
//!
//! The server runs on a dedicated thread to keep capture workers free from
//! runtime concerns; a oneshot channel drives graceful shutdown. Unary
//! operations are JSON-bodied routes; `ProcessFrames` is a bidirectional
//! NDJSON stream that ends when the inbound side closes.

use std::{sync::Arc, thread};

use actix_web::{
    web::{self, Bytes, BytesMut},
    App, HttpResponse, HttpServer,
};
use anyhow::{bail, Context, Result};
use async_stream::stream;
use futures_util::StreamExt;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::service::data::{
    FrameRequest, FrameResponse, ProcessingStats, StartStreamRequest, StopStreamRequest,
    StreamResponse,
};
use crate::service::registry::{RequestError, StreamRegistry};
use crate::service::telemetry;

/// Shared state backing HTTP handlers.
struct ServerState {
    registry: Arc<StreamRegistry>,
}

/// Handle for the RPC server thread.
pub struct RpcServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RpcServer {
    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the RPC server thread, returning once the listener is bound.
pub fn spawn_rpc_server(
    host: &str,
    port: u16,
    registry: Arc<StreamRegistry>,
) -> Result<RpcServer> {
    let bind_host = host.to_string();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(1);

    let handle = thread::Builder::new()
        .name("vision-rpc-server".into())
        .spawn(move || {
            let result = actix_web::rt::System::new().block_on(async move {
                let factory_registry = registry;
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(web::Data::new(ServerState {
                            registry: Arc::clone(&factory_registry),
                        }))
                        .configure(configure_routes)
                })
                .bind((bind_host.as_str(), port));

                let server = match server {
                    Ok(server) => server.run(),
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let srv_handle = server.handle();
                actix_web::rt::spawn(async move {
                    let _ = shutdown_rx.await;
                    srv_handle.stop(true).await;
                });

                server.await
            });
            if let Err(err) = result {
                error!("RPC server error: {err}");
            }
        })
        .context("failed to spawn RPC server thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(RpcServer {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }),
        Ok(Err(err)) => {
            let _ = handle.join();
            bail!("failed to bind {host}:{port}: {err}");
        }
        Err(_) => {
            let _ = handle.join();
            bail!("RPC server thread exited before binding");
        }
    }
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/v1/streams", web::post().to(start_stream_handler))
        .route("/v1/streams/stop", web::post().to(stop_stream_handler))
        .route(
            "/v1/streams/{camera_id}/status",
            web::get().to(stream_status_handler),
        )
        .route("/v1/health", web::get().to(health_handler))
        .route("/v1/frames", web::post().to(process_frames_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

fn invalid_argument(err: RequestError) -> HttpResponse {
    HttpResponse::BadRequest().json(StreamResponse::error(err.to_string()))
}

async fn start_stream_handler(
    request: web::Json<StartStreamRequest>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    info!(camera_id = %request.camera_id, url = %request.camera_url, "StartStream");
    match state
        .registry
        .start_stream(&request.camera_id, &request.camera_url)
    {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => invalid_argument(err),
    }
}

async fn stop_stream_handler(
    request: web::Json<StopStreamRequest>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    info!(camera_id = %request.camera_id, "StopStream");
    match state.registry.stop_stream(&request.camera_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => invalid_argument(err),
    }
}

async fn stream_status_handler(
    camera_id: web::Path<String>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    match state.registry.stream_status(&camera_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(err) => invalid_argument(err),
    }
}

async fn health_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.registry.health())
}

/// Bidirectional frame-processing stream: one NDJSON `FrameRequest` in, one
/// NDJSON `FrameResponse` out, until the inbound stream closes.
async fn process_frames_handler(
    payload: web::Payload,
    state: web::Data<ServerState>,
) -> HttpResponse {
    let registry = Arc::clone(&state.registry);

    let responses = stream! {
        let mut payload = payload;
        let mut buffer = BytesMut::new();

        while let Some(chunk) = payload.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("frame stream read error: {err}");
                    break;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.split_to(pos + 1);
                if let Some(response) = respond_to_line(&registry, &line[..line.len() - 1]) {
                    yield Ok::<Bytes, actix_web::Error>(response);
                }
            }
        }

        // Flush a trailing request without a newline terminator.
        if let Some(response) = respond_to_line(&registry, &buffer) {
            yield Ok::<Bytes, actix_web::Error>(response);
        }
    };

    HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(responses)
}

/// Parse one NDJSON line and synthesize the matching response.
fn respond_to_line(registry: &StreamRegistry, line: &[u8]) -> Option<Bytes> {
    let line = trim_line(line);
    if line.is_empty() {
        return None;
    }

    let request: FrameRequest = match serde_json::from_slice(line) {
        Ok(request) => request,
        Err(err) => {
            warn!("skipping malformed frame request: {err}");
            return None;
        }
    };

    registry.record_processed_frame();

    let response = FrameResponse {
        camera_id: request.camera_id,
        timestamp: request.timestamp,
        // Placeholder stats until per-frame processing rides this stream.
        processing_stats: ProcessingStats {
            processing_time_ms: 10,
            detections_count: 0,
            cpu_usage: 15.5,
            memory_usage_mb: 128,
        },
    };

    match serde_json::to_vec(&response) {
        Ok(mut json) => {
            json.push(b'\n');
            Some(Bytes::from(json))
        }
        Err(err) => {
            error!("failed to encode frame response: {err}");
            None
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut line = line;
    while let Some((last, rest)) = line.split_last() {
        if *last == b'\r' || *last == b'\n' {
            line = rest;
        } else {
            break;
        }
    }
    line
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not initialised"),
    }
}
