//! Outbound request limits: global pacing and per-class admission.

mod gate;
mod rate;

pub use gate::{ConcurrencyGate, DEFAULT_MAX_CONCURRENT, GatePermit};
pub use rate::{RateLimitConfig, RateLimiter};

use serde::Deserialize;

use crate::cache::DEFAULT_CACHE_MAX_ENTRIES;

/// Per-class capacity knobs, applied to both request classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Simultaneous operations per class. Default: 3.
    pub max_concurrent: usize,
    /// Result cache capacity per class. Default: 300.
    pub cache_max_entries: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl LimitsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn cache_max_entries(mut self, n: usize) -> Self {
        self.cache_max_entries = n;
        self
    }
}
