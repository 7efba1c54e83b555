//! Failover across a penalty-ordered endpoint pool.
//!
//! One logical request walks the pool from the best endpoint to the worst,
//! one attempt per endpoint, each attempt paced by the global
//! [`RateLimiter`] and bounded by the class timeout. The first success wins
//! and the endpoints after it are never contacted.
//!
//! # Penalty flow
//!
//! ```text
//! ordered pool: [A, B, C]
//!
//!   A ── HTTP 500 ──► A += 2
//!   B ── timeout ───► B += 2
//!   C ── ok(42) ────► C -= 1 ──► Some(42)
//! ```
//!
//! Endpoint errors of any kind are logged and absorbed here; the caller
//! only ever sees `Some(value)` or `None` when the whole pool failed.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::limits::RateLimiter;
use crate::pool::EndpointSelector;
use crate::telemetry;
use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Runs one logical request over a class's endpoint pool.
pub struct FailoverFetcher {
    selector: Arc<EndpointSelector>,
    limiter: Arc<RateLimiter>,
}

impl FailoverFetcher {
    pub fn new(selector: Arc<EndpointSelector>, limiter: Arc<RateLimiter>) -> Self {
        Self { selector, limiter }
    }

    pub fn selector(&self) -> &Arc<EndpointSelector> {
        &self.selector
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Try `operation` against each endpoint of `class` until one succeeds.
    ///
    /// `operation` receives the endpoint base URL. `key` is only used for
    /// logging. Returns `None` when every endpoint failed, or when the rate
    /// limiter was shut down before the pool was exhausted.
    pub async fn resolve<T, F, Fut>(
        &self,
        key: &str,
        class: RequestClass,
        timeout: Duration,
        operation: F,
    ) -> Option<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let penalties = self.selector.penalties();
        let endpoints = self.selector.ordered_endpoints(class);

        for endpoint in endpoints {
            if self.limiter.schedule().await.is_err() {
                debug!(%class, key, "rate limiter shut down, abandoning request");
                return None;
            }

            debug!(%class, key, endpoint = %endpoint.url, penalty = endpoint.penalty, "trying endpoint");
            let start = Instant::now();
            let outcome = attempt(timeout, operation(endpoint.url.clone())).await;
            metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS, "class" => class.as_str())
                .record(start.elapsed().as_secs_f64());

            match outcome {
                Ok(value) => {
                    penalties.record_success(class, &endpoint.url);
                    Self::record_attempt(class, &endpoint.url, "ok");
                    Self::record_request(class, "ok");
                    info!(%class, key, endpoint = %endpoint.url, "endpoint succeeded");
                    return Some(value);
                }
                Err(e) => {
                    let status = match e {
                        MirrorFetchError::Timeout(_) => "timeout",
                        _ => "error",
                    };
                    penalties.record_failure(class, &endpoint.url);
                    Self::record_attempt(class, &endpoint.url, status);
                    warn!(%class, key, endpoint = %endpoint.url, error = %e, "endpoint failed");
                }
            }
        }

        Self::record_request(class, "exhausted");
        warn!(%class, key, "all endpoints failed");
        None
    }

    fn record_attempt(class: RequestClass, endpoint: &str, status: &'static str) {
        metrics::counter!(telemetry::ATTEMPTS_TOTAL,
            "class" => class.as_str(),
            "endpoint" => endpoint.to_owned(),
            "status" => status,
        )
        .increment(1);
    }

    fn record_request(class: RequestClass, status: &'static str) {
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "class" => class.as_str(),
            "status" => status,
        )
        .increment(1);
    }
}

/// Run one attempt under `timeout`.
async fn attempt<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MirrorFetchError::Timeout(timeout)),
    }
}
