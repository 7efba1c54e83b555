//! Durable endpoint penalties.
//!
//! Every endpoint carries a bounded penalty per [`RequestClass`]. A failed
//! attempt raises it quickly, a success lowers it slowly, so endpoints that
//! keep failing sink to the back of the pool while one lucky success is not
//! enough to bring a flaky mirror back to the front.
//!
//! The table is advisory. Adjustments are read-modify-write against the
//! backend and serialized within a process; across processes the last
//! writer wins. When the backend cannot be read, every endpoint is treated
//! as penalty 0 for that call.

mod backend;

pub use backend::{
    ClassPenalties, JsonFilePenaltyBackend, MemoryPenaltyBackend, PenaltyBackend, PenaltyTable,
    default_penalty_path,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::Result;
use crate::telemetry;
use crate::types::RequestClass;

/// Penalty bounds and step sizes.
///
/// ```rust
/// # use mirrorfetch::PenaltyPolicy;
/// let policy = PenaltyPolicy::new().max(20).failure_delta(3);
/// assert_eq!(policy.success_delta, -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PenaltyPolicy {
    /// Upper bound for any penalty. Default: 50.
    pub max: u32,
    /// Applied when an endpoint succeeds. Default: -1.
    pub success_delta: i32,
    /// Applied when an endpoint fails or times out. Default: +2.
    pub failure_delta: i32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            max: 50,
            success_delta: -1,
            failure_delta: 2,
        }
    }
}

impl PenaltyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upper bound.
    pub fn max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }

    /// Set the delta applied on success.
    pub fn success_delta(mut self, delta: i32) -> Self {
        self.success_delta = delta;
        self
    }

    /// Set the delta applied on failure.
    pub fn failure_delta(mut self, delta: i32) -> Self {
        self.failure_delta = delta;
        self
    }

    /// Clamp `current + delta` into `[0, max]`.
    pub fn apply(&self, current: u32, delta: i32) -> u32 {
        (i64::from(current) + i64::from(delta)).clamp(0, i64::from(self.max)) as u32
    }
}

/// Penalty store over a [`PenaltyBackend`].
pub struct PenaltyStore {
    backend: Arc<dyn PenaltyBackend>,
    policy: PenaltyPolicy,
    write_lock: Mutex<()>,
}

impl PenaltyStore {
    pub fn new(backend: Arc<dyn PenaltyBackend>, policy: PenaltyPolicy) -> Self {
        Self {
            backend,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPenaltyBackend::new()), PenaltyPolicy::default())
    }

    pub fn policy(&self) -> PenaltyPolicy {
        self.policy
    }

    /// Snapshot of every known endpoint's penalty for `class`.
    ///
    /// Endpoints missing from the map have penalty 0. On a backend error the
    /// map is empty, i.e. every endpoint is neutral for this call.
    pub fn penalties(&self, class: RequestClass) -> HashMap<String, u32> {
        match self.backend.load() {
            Ok(table) => table
                .into_iter()
                .map(|(url, p)| (url, p.get(class).min(self.policy.max)))
                .collect(),
            Err(e) => {
                warn!(backend = self.backend.name(), %class, error = %e, "penalty table unreadable, using neutral penalties");
                HashMap::new()
            }
        }
    }

    /// Current penalty of one endpoint for `class`.
    pub fn penalty(&self, class: RequestClass, url: &str) -> u32 {
        self.penalties(class).get(url).copied().unwrap_or(0)
    }

    /// Add `delta` to an endpoint's penalty, clamped into `[0, max]`.
    ///
    /// Returns the new value. Persistence failures are logged and swallowed;
    /// the returned value is what the store attempted to write.
    pub fn adjust(&self, class: RequestClass, url: &str, delta: i32) -> u32 {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut table = match self.backend.load() {
            Ok(table) => table,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "penalty table unreadable, starting fresh");
                PenaltyTable::new()
            }
        };

        let entry = table.entry(url.to_string()).or_default();
        let before = entry.get(class).min(self.policy.max);
        let after = self.policy.apply(before, delta);
        entry.set(class, after);

        if let Err(e) = self.backend.save(&table) {
            warn!(backend = self.backend.name(), error = %e, "failed to persist penalty table");
        }

        let direction = if delta < 0 { "down" } else { "up" };
        metrics::counter!(telemetry::PENALTY_ADJUSTMENTS_TOTAL,
            "class" => class.as_str(),
            "direction" => direction,
        )
        .increment(1);
        debug!(%class, endpoint = url, before, after, "penalty adjusted");

        after
    }

    /// Apply the policy's success delta.
    pub fn record_success(&self, class: RequestClass, url: &str) -> u32 {
        self.adjust(class, url, self.policy.success_delta)
    }

    /// Apply the policy's failure delta.
    pub fn record_failure(&self, class: RequestClass, url: &str) -> u32 {
        self.adjust(class, url, self.policy.failure_delta)
    }

    /// The full table, for inspection.
    pub fn table(&self) -> Result<PenaltyTable> {
        self.backend.load()
    }

    /// Forget every penalty.
    pub fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.backend.save(&PenaltyTable::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MirrorFetchError;

    struct BrokenBackend;

    impl PenaltyBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        fn load(&self) -> Result<PenaltyTable> {
            Err(MirrorFetchError::Persistence("disk on fire".into()))
        }

        fn save(&self, _table: &PenaltyTable) -> Result<()> {
            Err(MirrorFetchError::Persistence("disk on fire".into()))
        }
    }

    #[test]
    fn policy_defaults() {
        let policy = PenaltyPolicy::default();
        assert_eq!(policy.max, 50);
        assert_eq!(policy.success_delta, -1);
        assert_eq!(policy.failure_delta, 2);
    }

    #[test]
    fn apply_clamps_both_ends() {
        let policy = PenaltyPolicy::default();
        assert_eq!(policy.apply(0, -1), 0);
        assert_eq!(policy.apply(49, 2), 50);
        assert_eq!(policy.apply(10, i32::MIN), 0);
        assert_eq!(policy.apply(10, i32::MAX), 50);
        assert_eq!(policy.apply(u32::MAX, 0), 50);
    }

    #[test]
    fn absent_endpoint_is_zero() {
        let store = PenaltyStore::in_memory();
        assert_eq!(store.penalty(RequestClass::Api, "https://nowhere"), 0);
    }

    #[test]
    fn classes_are_independent() {
        let store = PenaltyStore::in_memory();
        store.record_failure(RequestClass::Api, "https://a");
        assert_eq!(store.penalty(RequestClass::Api, "https://a"), 2);
        assert_eq!(store.penalty(RequestClass::Media, "https://a"), 0);
    }

    #[test]
    fn success_from_zero_stays_at_zero() {
        let store = PenaltyStore::in_memory();
        assert_eq!(store.record_success(RequestClass::Media, "https://a"), 0);
    }

    #[test]
    fn many_failures_saturate_at_max() {
        let store = PenaltyStore::in_memory();
        for _ in 0..100 {
            store.record_failure(RequestClass::Api, "https://a");
        }
        assert_eq!(store.penalty(RequestClass::Api, "https://a"), 50);
    }

    #[test]
    fn stored_values_above_max_are_clamped_on_read() {
        let mut table = PenaltyTable::new();
        table.insert("https://a".into(), ClassPenalties { api: 900, media: 0 });
        let store = PenaltyStore::new(
            Arc::new(MemoryPenaltyBackend::with_table(table)),
            PenaltyPolicy::default(),
        );
        assert_eq!(store.penalty(RequestClass::Api, "https://a"), 50);
        assert_eq!(store.record_success(RequestClass::Api, "https://a"), 49);
    }

    #[test]
    fn broken_backend_is_neutral() {
        let store = PenaltyStore::new(Arc::new(BrokenBackend), PenaltyPolicy::default());
        assert!(store.penalties(RequestClass::Api).is_empty());
        // adjust still reports the value it tried to write
        assert_eq!(store.record_failure(RequestClass::Api, "https://a"), 2);
    }

    #[test]
    fn reset_clears_table() {
        let store = PenaltyStore::in_memory();
        store.record_failure(RequestClass::Api, "https://a");
        store.reset().unwrap();
        assert!(store.table().unwrap().is_empty());
    }
}
