//! Shared counter names for metrics that cross a crate boundary (emitted in
//! one crate, read back in another). Kept as constants so the emitter and
//! any reader agree on one spelling instead of drifting apart.

pub const PIPELINE_REQUESTS_PROCESSED: &str = "pipeline_requests_processed";
pub const PIPELINE_ERRORS: &str = "pipeline_errors";
pub const PIPELINE_CACHE_HIT: &str = "pipeline_cache_hit";
pub const PIPELINE_CACHE_MISS: &str = "pipeline_cache_miss";
