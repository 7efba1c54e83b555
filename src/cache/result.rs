//! Bounded insertion-order result cache.
//!
//! [`ResultCache`] keeps at most `max_entries` values. `put` moves the key
//! to the newest position; when the cache overflows, the oldest entry is
//! evicted. `get` does not reorder, so the evicted entry is always the
//! least recently inserted one still present.
//!
//! Values may own resources outside the cache (media handles). Every value
//! leaving the cache, whatever the reason, is passed to the eviction
//! listener, which is where those resources are released. The listener runs
//! after the internal lock is dropped.

use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::telemetry;

/// Default maximum number of entries per cache.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 300;

/// Why a value left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Evicted to make room.
    Size,
    /// Overwritten by a `put` for the same key.
    Replaced,
    /// Removed with [`ResultCache::remove`].
    Explicit,
    /// Dropped by [`ResultCache::clear`].
    Cleared,
}

impl RemovalCause {
    fn as_str(&self) -> &'static str {
        match self {
            RemovalCause::Size => "size",
            RemovalCause::Replaced => "replaced",
            RemovalCause::Explicit => "explicit",
            RemovalCause::Cleared => "cleared",
        }
    }
}

type EvictionListener<K, V> = Arc<dyn Fn(&K, V, RemovalCause) + Send + Sync>;

/// Thread-safe bounded map from request key to resolved value.
pub struct ResultCache<K, V> {
    entries: Mutex<IndexMap<K, V>>,
    max_entries: usize,
    label: &'static str,
    listener: Option<EvictionListener<K, V>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Cache holding at most `max_entries` values (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries: max_entries.max(1),
            label: "none",
            listener: None,
        }
    }

    /// Label used for metrics (usually the request class).
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Call `listener` for every value that leaves the cache.
    pub fn with_eviction_listener(
        mut self,
        listener: impl Fn(&K, V, RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Look up a value. Does not change eviction order.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Insert or re-insert `key` as the newest entry, evicting the oldest
    /// entries while over capacity.
    pub fn put(&self, key: K, value: V) {
        let mut removed = Vec::new();
        {
            let mut map = self.lock();
            if let Some(old) = map.shift_remove(&key) {
                removed.push((key.clone(), old, RemovalCause::Replaced));
            }
            map.insert(key, value);
            while map.len() > self.max_entries {
                match map.shift_remove_index(0) {
                    Some((k, v)) => removed.push((k, v, RemovalCause::Size)),
                    None => break,
                }
            }
        }
        self.notify(removed);
    }

    /// Remove one entry, returning its value.
    ///
    /// The listener still sees the value, so callers must not release its
    /// resources a second time.
    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.lock().shift_remove(key);
        if let Some(value) = &removed {
            self.notify(vec![(key.clone(), value.clone(), RemovalCause::Explicit)]);
        }
        removed
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<(K, V)> = self.lock().drain(..).collect();
        let count = drained.len();
        self.notify(
            drained
                .into_iter()
                .map(|(k, v)| (k, v, RemovalCause::Cleared))
                .collect(),
        );
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> Vec<K> {
        self.lock().keys().cloned().collect()
    }

    fn notify(&self, removed: Vec<(K, V, RemovalCause)>) {
        for (key, value, cause) in removed {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                "class" => self.label,
                "cause" => cause.as_str(),
            )
            .increment(1);
            if let Some(listener) = &self.listener {
                listener(&key, value, cause);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<K, V>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_cache(
        max: usize,
    ) -> (
        ResultCache<String, u32>,
        Arc<Mutex<Vec<(String, u32, RemovalCause)>>>,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let cache = ResultCache::new(max).with_eviction_listener(move |k: &String, v, cause| {
            sink.lock().unwrap().push((k.clone(), v, cause));
        });
        (cache, log)
    }

    #[test]
    fn evicts_least_recently_inserted() {
        let (cache, log) = recording_cache(2);
        cache.put("x".into(), 1);
        cache.put("y".into(), 2);
        cache.put("z".into(), 3);

        assert_eq!(cache.keys(), ["y", "z"]);
        assert!(cache.get(&"x".into()).is_none());
        assert_eq!(
            log.lock().unwrap().as_slice(),
            [("x".to_string(), 1, RemovalCause::Size)]
        );
    }

    #[test]
    fn get_does_not_refresh() {
        let (cache, _) = recording_cache(2);
        cache.put("x".into(), 1);
        cache.put("y".into(), 2);
        assert_eq!(cache.get(&"x".into()), Some(1));
        cache.put("z".into(), 3);
        assert_eq!(cache.keys(), ["y", "z"]);
    }

    #[test]
    fn reinsert_moves_to_newest_and_reports_replacement() {
        let (cache, log) = recording_cache(2);
        cache.put("x".into(), 1);
        cache.put("y".into(), 2);
        cache.put("x".into(), 10);
        cache.put("z".into(), 3);

        assert_eq!(cache.keys(), ["x", "z"]);
        assert_eq!(cache.get(&"x".into()), Some(10));
        let log = log.lock().unwrap();
        assert_eq!(log[0], ("x".to_string(), 1, RemovalCause::Replaced));
        assert_eq!(log[1], ("y".to_string(), 2, RemovalCause::Size));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache: ResultCache<u32, u32> = ResultCache::new(5);
        for i in 0..100 {
            cache.put(i % 17, i);
            assert!(cache.len() <= 5);
        }
    }

    #[test]
    fn clear_reports_every_entry() {
        let (cache, log) = recording_cache(10);
        cache.put("a".into(), 1);
        cache.put("b".into(), 2);

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, _, c)| *c == RemovalCause::Cleared));
    }

    #[test]
    fn remove_reports_explicit() {
        let (cache, log) = recording_cache(10);
        cache.put("a".into(), 1);
        assert_eq!(cache.remove(&"a".into()), Some(1));
        assert_eq!(cache.remove(&"a".into()), None);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let cache: ResultCache<u32, u32> = ResultCache::new(0);
        cache.put(1, 1);
        assert_eq!(cache.max_entries(), 1);
        assert_eq!(cache.get(&1), Some(1));
    }
}
