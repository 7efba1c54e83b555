//! Per-class admission control.
//!
//! [`ConcurrencyGate`] admits at most `limit` operations at once. Callers
//! beyond the limit wait in a FIFO queue and are woken as soon as a slot is
//! released (tokio's semaphore is fair), so there is no polling and
//! admission order equals arrival order.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Default number of simultaneous operations per class.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Bounded admission for one request class.
pub struct ConcurrencyGate {
    class: RequestClass,
    limit: usize,
    semaphore: Arc<Semaphore>,
}

/// Slot held by an admitted operation. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Gate admitting at most `limit` operations. A limit of 0 is rejected.
    pub fn new(class: RequestClass, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(MirrorFetchError::Configuration(format!(
                "{class} concurrency limit must be greater than zero"
            )));
        }
        Ok(Self {
            class,
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        })
    }

    pub fn class(&self) -> RequestClass {
        self.class
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of operations currently admitted.
    pub fn active(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for a slot.
    ///
    /// Returns [`MirrorFetchError::Shutdown`] once the gate is closed, including
    /// for callers already waiting.
    pub async fn admit(&self) -> Result<GatePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map(|permit| GatePermit { _permit: permit })
            .map_err(|_| MirrorFetchError::Shutdown)
    }

    /// Close the gate: waiting and future callers are refused.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn zero_limit_rejected() {
        assert!(ConcurrencyGate::new(RequestClass::Api, 0).is_err());
    }

    #[tokio::test]
    async fn active_tracks_permits() {
        let gate = ConcurrencyGate::new(RequestClass::Api, 2).unwrap();
        let a = gate.admit().await.unwrap();
        let b = gate.admit().await.unwrap();
        assert_eq!(gate.active(), 2);
        drop(a);
        assert_eq!(gate.active(), 1);
        drop(b);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn closed_gate_refuses() {
        let gate = ConcurrencyGate::new(RequestClass::Media, 1).unwrap();
        gate.close();
        assert!(matches!(gate.admit().await, Err(MirrorFetchError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_admitted_in_arrival_order() {
        let gate = Arc::new(ConcurrencyGate::new(RequestClass::Api, 1).unwrap());
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = gate.admit().await.unwrap();

        let mut waiters = Vec::new();
        for n in 0..5 {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                let _permit = gate.admit().await.unwrap();
                order.lock().unwrap().push(n);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
            // let this waiter join the queue before the next one is spawned
            tokio::task::yield_now().await;
        }
        assert!(order.lock().unwrap().is_empty());
        assert_eq!(gate.active(), 1);

        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3, 4]);
        assert_eq!(gate.active(), 0);
    }
}
