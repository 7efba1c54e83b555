//! Request deduplication in front of the failover chain.
//!
//! [`RequestDeduplicator::obtain`] answers from the [`ResultCache`] when it
//! can. Otherwise it makes sure exactly one operation per key is in flight:
//! the first caller registers a shared pending future before anything
//! awaits, and every caller arriving while it runs (including while it is
//! still queued at the [`ConcurrencyGate`]) awaits that same future.
//!
//! The operation runs as its own task. A caller that stops waiting does not
//! cancel it for the others, and the pending entry is removed when the task
//! settles, after a successful value has been cached.
//!
//! ```text
//! obtain(key)
//!     │
//!     ├─ cache hit ─────────────────────────────► value
//!     ├─ pending for key ──── await shared ─────► value
//!     └─ register pending, spawn:
//!            gate.admit() → producer() → cache.put (Some only)
//!            → remove pending
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

use crate::cache::ResultCache;
use crate::limits::ConcurrencyGate;
use crate::telemetry;
use crate::types::RequestClass;

type Pending<V> = Shared<BoxFuture<'static, Option<V>>>;
type PendingMap<K, V> = Arc<Mutex<HashMap<K, Pending<V>>>>;

/// Collapses concurrent requests for the same key onto one operation.
pub struct RequestDeduplicator<K, V> {
    class: RequestClass,
    cache: Arc<ResultCache<K, V>>,
    gate: Arc<ConcurrencyGate>,
    pending: PendingMap<K, V>,
}

impl<K, V> RequestDeduplicator<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        class: RequestClass,
        cache: Arc<ResultCache<K, V>>,
        gate: Arc<ConcurrencyGate>,
    ) -> Self {
        Self {
            class,
            cache,
            gate,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache<K, V>> {
        &self.cache
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Number of keys with an operation in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    /// Resolve `key`, running `producer` only if no cached value and no
    /// in-flight operation exists for it.
    ///
    /// `None` from the producer is shared with every waiter but never cached.
    /// Once the gate is closed every call returns `None` and nothing more is
    /// cached.
    pub async fn obtain<F, Fut>(&self, key: K, producer: F) -> Option<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<V>> + Send + 'static,
    {
        let class = self.class.as_str();
        if self.gate.is_closed() {
            debug!(class, "gate closed");
            return None;
        }
        if let Some(value) = self.cache.get(&key) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "class" => class).increment(1);
            debug!(class, "cache hit");
            return Some(value);
        }

        let shared = {
            let mut pending = lock(&self.pending);
            if let Some(existing) = pending.get(&key) {
                metrics::counter!(telemetry::COALESCED_TOTAL, "class" => class).increment(1);
                debug!(class, "joining in-flight request");
                existing.clone()
            } else {
                // A settling operation caches before it unregisters.
                if let Some(value) = self.cache.get(&key) {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL, "class" => class).increment(1);
                    return Some(value);
                }
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "class" => class).increment(1);

                let task = tokio::spawn(run_operation(
                    key.clone(),
                    Arc::clone(&self.cache),
                    Arc::clone(&self.gate),
                    Arc::clone(&self.pending),
                    producer,
                ));
                let future: Pending<V> = async move { task.await.ok().flatten() }
                    .boxed()
                    .shared();
                pending.insert(key, future.clone());
                future
            }
        };

        shared.await
    }
}

async fn run_operation<K, V, F, Fut>(
    key: K,
    cache: Arc<ResultCache<K, V>>,
    gate: Arc<ConcurrencyGate>,
    pending: PendingMap<K, V>,
    producer: F,
) -> Option<V>
where
    K: Hash + Eq + Clone,
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<V>>,
{
    // Unregisters even if the producer panics.
    let _unregister = Unregister {
        key: key.clone(),
        pending,
    };

    let value = match gate.admit().await {
        Ok(permit) => {
            let value = producer().await;
            drop(permit);
            value
        }
        Err(_) => None,
    };

    // A closed gate means the owner shut down and cleared the cache while
    // this operation was running. Closing happens before clearing, so a put
    // that races the clear is undone here.
    if let Some(value) = &value {
        if !gate.is_closed() {
            cache.put(key.clone(), value.clone());
            if gate.is_closed() {
                cache.remove(&key);
            }
        }
    }
    value
}

struct Unregister<K: Hash + Eq, V> {
    key: K,
    pending: PendingMap<K, V>,
}

impl<K: Hash + Eq, V> Drop for Unregister<K, V> {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
    }
}

fn lock<K, V>(map: &Mutex<HashMap<K, Pending<V>>>) -> MutexGuard<'_, HashMap<K, Pending<V>>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}
