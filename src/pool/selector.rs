//! Penalty-ordered endpoint selection.

use std::sync::Arc;

use crate::penalty::PenaltyStore;
use crate::types::{Endpoint, RequestClass};

/// Orders each class's endpoint pool by ascending penalty.
///
/// Ties keep the configured pool order (stable sort), so with a fresh
/// penalty table the pool is tried exactly as configured.
pub struct EndpointSelector {
    api: Vec<String>,
    media: Vec<String>,
    penalties: Arc<PenaltyStore>,
}

impl EndpointSelector {
    pub fn new(api: Vec<String>, media: Vec<String>, penalties: Arc<PenaltyStore>) -> Self {
        Self {
            api,
            media,
            penalties,
        }
    }

    /// The configured pool for `class`, in configured order.
    pub fn pool(&self, class: RequestClass) -> &[String] {
        match class {
            RequestClass::Api => &self.api,
            RequestClass::Media => &self.media,
        }
    }

    pub fn penalties(&self) -> &Arc<PenaltyStore> {
        &self.penalties
    }

    /// Snapshot of the pool for `class`, best endpoint first.
    pub fn ordered_endpoints(&self, class: RequestClass) -> Vec<Endpoint> {
        let snapshot = self.penalties.penalties(class);
        let mut endpoints: Vec<Endpoint> = self
            .pool(class)
            .iter()
            .map(|url| Endpoint::new(url.clone(), snapshot.get(url).copied().unwrap_or(0)))
            .collect();
        endpoints.sort_by_key(|e| e.penalty);
        endpoints
    }
}
