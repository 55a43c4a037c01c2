//! Service layer tying the capture and detection crates to the RPC surface.
//!
//! The module is split into focused submodules:
//! - `config`: service constants and settings.
//! - `data`: wire types exchanged with callers.
//! - `registry`: the concurrent index of active capture sessions.
//! - `server`: actix-web RPC surface running on a dedicated thread.
//! - `telemetry`: tracing and Prometheus metrics bootstrap.

pub mod config;
pub mod data;
pub mod registry;
pub mod server;
pub mod telemetry;
