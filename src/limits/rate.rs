//! Global request pacing.
//!
//! [`RateLimiter`] keeps one FIFO queue of waiting callers and one drain
//! loop. The loop releases the head of the queue, sleeps for the configured
//! interval, then releases the next caller; when the queue runs dry the loop
//! exits and the next caller starts a new one. Throughput therefore never
//! exceeds `1 / interval` no matter how many callers arrive at once, and
//! callers are released strictly in arrival order.
//!
//! # Example
//!
//! ```rust
//! use mirrorfetch::limits::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() -> mirrorfetch::Result<()> {
//! let limiter = RateLimiter::new(&RateLimitConfig::new().max_requests_per_second(3.0));
//! limiter.schedule().await?; // first caller proceeds immediately
//! limiter.schedule().await?; // second waits ~333ms
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{MirrorFetchError, Result};

/// Configuration for the global rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Ceiling on outgoing requests per second. Zero or negative disables
    /// pacing. Default: 3.
    pub max_requests_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 3.0,
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that applies no pacing.
    pub fn disabled() -> Self {
        Self {
            max_requests_per_second: 0.0,
        }
    }

    /// Set the requests-per-second ceiling.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = rps;
        self
    }

    /// Gap enforced between two consecutive releases.
    ///
    /// A rate so small that the gap does not fit in a [`Duration`] saturates
    /// to [`Duration::MAX`]; [`validate`](Self::validate) rejects it.
    pub fn interval(&self) -> Duration {
        self.try_interval().unwrap_or(Duration::MAX)
    }

    /// Reject a positive rate whose interval cannot be represented.
    pub fn validate(&self) -> Result<()> {
        self.try_interval().map(|_| ()).ok_or_else(|| {
            MirrorFetchError::Configuration(format!(
                "max_requests_per_second {} is too small",
                self.max_requests_per_second
            ))
        })
    }

    fn try_interval(&self) -> Option<Duration> {
        let rps = self.max_requests_per_second;
        if rps.is_finite() && rps > 0.0 {
            Duration::try_from_secs_f64(1.0 / rps).ok()
        } else {
            Some(Duration::ZERO)
        }
    }
}

#[derive(Default)]
struct QueueState {
    waiters: VecDeque<oneshot::Sender<()>>,
    draining: bool,
    closed: bool,
}

/// FIFO request pacer shared by every outbound call of a relay.
pub struct RateLimiter {
    interval: Duration,
    state: Arc<Mutex<QueueState>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_interval(config.interval())
    }

    /// Limiter releasing one caller per `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of callers currently waiting.
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Wait until this caller may send a request.
    ///
    /// Returns [`MirrorFetchError::Shutdown`] if the limiter was shut down,
    /// or reset while the caller was queued.
    pub async fn schedule(&self) -> Result<()> {
        let rx = {
            let mut state = self.lock();
            if state.closed {
                return Err(MirrorFetchError::Shutdown);
            }
            if self.interval.is_zero() {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            if !state.draining {
                state.draining = true;
                tokio::spawn(drain(Arc::clone(&self.state), self.interval));
            }
            rx
        };
        rx.await.map_err(|_| MirrorFetchError::Shutdown)
    }

    /// Drop every queued caller. Returns how many were waiting.
    ///
    /// Dropped callers observe [`MirrorFetchError::Shutdown`]. New callers
    /// are still accepted.
    pub fn reset(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.waiters.len();
        state.waiters.clear();
        if dropped > 0 {
            debug!(dropped, "rate limiter queue cleared");
        }
        dropped
    }

    /// Clear the queue and refuse all future callers.
    pub fn shutdown(&self) -> usize {
        self.lock().closed = true;
        self.reset()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The single drain loop. Exits when the queue is empty.
async fn drain(state: Arc<Mutex<QueueState>>, interval: Duration) {
    loop {
        let next = {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            match guard.waiters.pop_front() {
                Some(tx) => tx,
                None => {
                    guard.draining = false;
                    return;
                }
            }
        };
        // A waiter that gave up does not consume a slot.
        if next.send(()).is_err() {
            continue;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_from_rps() {
        assert_eq!(
            RateLimitConfig::new()
                .max_requests_per_second(4.0)
                .interval(),
            Duration::from_millis(250)
        );
        assert_eq!(RateLimitConfig::disabled().interval(), Duration::ZERO);
        assert_eq!(
            RateLimitConfig::new()
                .max_requests_per_second(f64::NAN)
                .interval(),
            Duration::ZERO
        );
    }

    #[test]
    fn tiny_rate_is_rejected_without_panicking() {
        let config = RateLimitConfig::new().max_requests_per_second(1e-20);
        assert_eq!(config.interval(), Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(MirrorFetchError::Configuration(_))
        ));

        assert!(RateLimitConfig::new().max_requests_per_second(0.001).validate().is_ok());
        assert!(RateLimitConfig::disabled().validate().is_ok());
        assert!(RateLimitConfig::new().max_requests_per_second(-1.0).validate().is_ok());
    }

    #[test]
    fn default_is_three_per_second() {
        let interval = RateLimitConfig::default().interval();
        assert!(interval > Duration::from_millis(333) && interval < Duration::from_millis(334));
    }

    #[tokio::test]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::with_interval(Duration::ZERO);
        for _ in 0..10 {
            limiter.schedule().await.unwrap();
        }
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn shut_down_limiter_rejects() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(10));
        limiter.shutdown();
        assert!(matches!(
            limiter.schedule().await,
            Err(MirrorFetchError::Shutdown)
        ));
    }
}
