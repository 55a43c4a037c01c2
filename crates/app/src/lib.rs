//! Multi-tenant vision ingest service.
//!
//! Accepts RPC requests to open, monitor, and close video capture sessions
//! from heterogeneous sources, runs each session on its own capture loop,
//! and streams per-session statistics and detection results to callers.

pub mod cli;
pub mod service;
