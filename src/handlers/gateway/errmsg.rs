//! Error message constants for gateway handlers.
//!
//! User-facing error messages should be sanitized to avoid leaking infrastructure details.
//! Full error details are logged internally.

/// Control channel backend could not be reached.
pub const BACKEND_UNAVAILABLE: &str = "Replay backend temporarily unavailable";

/// Control channel backend did not answer in time.
pub const BACKEND_TIMEOUT: &str = "Replay backend did not reply in time";

/// Backend reply could not be decoded into the expected response.
pub const UNDECODABLE_REPLY: &str = "Replay backend returned an invalid reply";

/// Published telemetry could not be decoded; the session is ended.
pub const UNDECODABLE_SAMPLE: &str = "Live telemetry contained an invalid sample";

/// The service released its endpoints and accepts no more work.
pub const SERVICE_STOPPED: &str = "Gateway is shutting down";
