//! Service-level constants.

/// Global admission cap on concurrently active capture sessions.
pub const MAX_CONCURRENT_STREAMS: usize = 10;

/// Advisory idle-session bound in seconds, reserved for future eviction.
pub const STREAM_TIMEOUT_SEC: u64 = 300;

/// Fraction of the admission cap at which health degrades.
pub const CAPACITY_WARN_RATIO: f64 = 0.9;

pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
