//! Telemetry metric name constants.
//!
//! Centralised metric names for mirrorfetch operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mirrorfetch_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `class`: request class: "api" or "media"
//! - `endpoint`: mirror base URL
//! - `status`: outcome: "ok", "error" or "timeout"

/// Total logical requests that reached the failover chain.
///
/// Labels: `class`, `status` ("ok" | "exhausted").
pub const REQUESTS_TOTAL: &str = "mirrorfetch_requests_total";

/// Total single-endpoint attempts.
///
/// Labels: `class`, `endpoint`, `status` ("ok" | "error" | "timeout").
pub const ATTEMPTS_TOTAL: &str = "mirrorfetch_attempts_total";

/// Single-endpoint attempt duration in seconds.
///
/// Labels: `class`.
pub const ATTEMPT_DURATION_SECONDS: &str = "mirrorfetch_attempt_duration_seconds";

/// Total result cache hits.
///
/// Labels: `class`.
pub const CACHE_HITS_TOTAL: &str = "mirrorfetch_cache_hits_total";

/// Total result cache misses.
///
/// Labels: `class`.
pub const CACHE_MISSES_TOTAL: &str = "mirrorfetch_cache_misses_total";

/// Total entries removed from a result cache.
///
/// Labels: `class`, `cause` ("size" | "replaced" | "explicit" | "cleared").
pub const CACHE_EVICTIONS_TOTAL: &str = "mirrorfetch_cache_evictions_total";

/// Total callers that joined an already in-flight request.
///
/// Labels: `class`.
pub const COALESCED_TOTAL: &str = "mirrorfetch_coalesced_total";

/// Total penalty adjustments.
///
/// Labels: `class`, `direction` ("up" | "down").
pub const PENALTY_ADJUSTMENTS_TOTAL: &str = "mirrorfetch_penalty_adjustments_total";
