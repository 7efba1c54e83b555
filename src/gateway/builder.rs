//! Builder for configuring relay instances

use std::path::PathBuf;
use std::sync::Arc;

use super::relay::{Relay, RelayParts};
use crate::backend::{HttpMirrorBackend, MirrorBackend};
use crate::failover::FailoverFetcher;
use crate::limits::{ConcurrencyGate, LimitsConfig, RateLimitConfig, RateLimiter};
use crate::penalty::{
    JsonFilePenaltyBackend, MemoryPenaltyBackend, PenaltyBackend, PenaltyPolicy, PenaltyStore,
};
use crate::pool::{EndpointSelector, PoolConfig};
use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Main entry point for creating relays.
pub struct MirrorFetch;

impl MirrorFetch {
    /// Create a new builder for configuring a relay.
    pub fn builder() -> MirrorFetchBuilder {
        MirrorFetchBuilder::new()
    }
}

/// Builder for configuring relay instances.
///
/// Every knob has a default matching the public catboy.best mirrors, so
/// `MirrorFetch::builder().build()` gives a working relay with penalties
/// persisted under the user cache directory.
pub struct MirrorFetchBuilder {
    api_pool: PoolConfig,
    media_pool: PoolConfig,
    limits: LimitsConfig,
    rate_limit: RateLimitConfig,
    penalty_policy: PenaltyPolicy,
    penalty_backend: Option<Arc<dyn PenaltyBackend>>,
    backend: Option<Arc<dyn MirrorBackend>>,
}

impl Default for MirrorFetchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorFetchBuilder {
    pub fn new() -> Self {
        Self {
            api_pool: PoolConfig::default_for(RequestClass::Api),
            media_pool: PoolConfig::default_for(RequestClass::Media),
            limits: LimitsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            penalty_policy: PenaltyPolicy::default(),
            penalty_backend: None,
            backend: None,
        }
    }

    /// Replace the resolution pool.
    pub fn api_pool(mut self, pool: PoolConfig) -> Self {
        self.api_pool = pool;
        self
    }

    /// Replace the media pool.
    pub fn media_pool(mut self, pool: PoolConfig) -> Self {
        self.media_pool = pool;
        self
    }

    /// Replace the resolution mirrors, keeping path and timeout.
    pub fn api_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_pool.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the media mirrors, keeping path, timeout, and size check.
    pub fn media_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_pool.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Simultaneous operations per request class (default: 3).
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.limits.max_concurrent = n;
        self
    }

    /// Result cache capacity per request class (default: 300).
    pub fn cache_max_entries(mut self, n: usize) -> Self {
        self.limits.cache_max_entries = n;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Global request ceiling across both pools (default: 3/s). Zero
    /// disables pacing.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.rate_limit.max_requests_per_second = rps;
        self
    }

    pub fn penalty_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.penalty_policy = policy;
        self
    }

    /// Use a custom penalty backend.
    pub fn penalty_backend(mut self, backend: Arc<dyn PenaltyBackend>) -> Self {
        self.penalty_backend = Some(backend);
        self
    }

    /// Persist penalties to a JSON file at `path`.
    pub fn penalty_file(self, path: impl Into<PathBuf>) -> Self {
        self.penalty_backend(Arc::new(JsonFilePenaltyBackend::new(path)))
    }

    /// Keep penalties in memory only.
    pub fn in_memory_penalties(self) -> Self {
        self.penalty_backend(Arc::new(MemoryPenaltyBackend::new()))
    }

    /// Use a custom mirror transport instead of HTTP.
    pub fn backend(mut self, backend: Arc<dyn MirrorBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the relay.
    ///
    /// Fails on configuration that could never succeed: an empty pool, a
    /// zero timeout, a path without a placeholder, a zero concurrency limit,
    /// a zero cache capacity, or a rate too small to pace.
    pub fn build(self) -> Result<Relay> {
        self.api_pool.validate(RequestClass::Api)?;
        self.media_pool.validate(RequestClass::Media)?;
        self.rate_limit.validate()?;
        if self.limits.cache_max_entries == 0 {
            return Err(MirrorFetchError::Configuration(
                "cache_max_entries must be greater than zero".into(),
            ));
        }
        if self.penalty_policy.failure_delta < 0 || self.penalty_policy.success_delta > 0 {
            return Err(MirrorFetchError::Configuration(
                "failures must not lower penalties and successes must not raise them".into(),
            ));
        }

        let api_gate = ConcurrencyGate::new(RequestClass::Api, self.limits.max_concurrent)?;
        let media_gate = ConcurrencyGate::new(RequestClass::Media, self.limits.max_concurrent)?;

        let penalty_backend = self
            .penalty_backend
            .unwrap_or_else(|| Arc::new(JsonFilePenaltyBackend::default_location()));
        let penalties = Arc::new(PenaltyStore::new(penalty_backend, self.penalty_policy));

        let backend: Arc<dyn MirrorBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpMirrorBackend::new()?),
        };

        let selector = Arc::new(EndpointSelector::new(
            self.api_pool.endpoints.clone(),
            self.media_pool.endpoints.clone(),
            penalties,
        ));
        let limiter = Arc::new(RateLimiter::new(&self.rate_limit));

        Ok(Relay::from_parts(RelayParts {
            api_pool: self.api_pool,
            media_pool: self.media_pool,
            backend,
            fetcher: FailoverFetcher::new(selector, limiter),
            api_gate,
            media_gate,
            cache_max_entries: self.limits.cache_max_entries,
        }))
    }
}
