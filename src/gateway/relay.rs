//! The relay: one owned context per configured mirror setup.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument};

use crate::backend::MirrorBackend;
use crate::cache::{BlobRegistry, ResultCache};
use crate::dedup::RequestDeduplicator;
use crate::failover::FailoverFetcher;
use crate::limits::ConcurrencyGate;
use crate::penalty::PenaltyStore;
use crate::pool::PoolConfig;
use crate::types::{Endpoint, MediaHandle, RequestClass, ResourceId};
use crate::MirrorFetchError;

/// Everything a [`Relay`] is assembled from. Built by
/// [`MirrorFetchBuilder`](super::MirrorFetchBuilder).
pub(crate) struct RelayParts {
    pub api_pool: PoolConfig,
    pub media_pool: PoolConfig,
    pub backend: Arc<dyn MirrorBackend>,
    pub fetcher: FailoverFetcher,
    pub api_gate: ConcurrencyGate,
    pub media_gate: ConcurrencyGate,
    pub cache_max_entries: usize,
}

struct RelayInner {
    api_pool: PoolConfig,
    media_pool: PoolConfig,
    backend: Arc<dyn MirrorBackend>,
    fetcher: FailoverFetcher,
    ids: RequestDeduplicator<String, ResourceId>,
    media: RequestDeduplicator<ResourceId, MediaHandle>,
    blobs: Arc<BlobRegistry>,
}

/// Resolve-then-fetch front end over redundant mirror pools.
///
/// Cloning is cheap and clones share all state: caches, in-flight requests,
/// admission gates, the rate limiter, and the penalty store. Separate
/// relays built from separate builders share nothing except whatever
/// penalty backend they were given.
///
/// Neither public operation returns an error. `None` means "temporarily
/// unavailable": every mirror in the pool failed, or the relay was shut
/// down.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    pub(crate) fn from_parts(parts: RelayParts) -> Self {
        let blobs = Arc::new(BlobRegistry::new());

        let ids = RequestDeduplicator::new(
            RequestClass::Api,
            Arc::new(ResultCache::new(parts.cache_max_entries).with_label("api")),
            Arc::new(parts.api_gate),
        );

        let registry = Arc::clone(&blobs);
        let media_cache = ResultCache::new(parts.cache_max_entries)
            .with_label("media")
            .with_eviction_listener(move |_id: &ResourceId, handle: MediaHandle, _cause| {
                registry.revoke(&handle);
            });
        let media = RequestDeduplicator::new(
            RequestClass::Media,
            Arc::new(media_cache),
            Arc::new(parts.media_gate),
        );

        Self {
            inner: Arc::new(RelayInner {
                api_pool: parts.api_pool,
                media_pool: parts.media_pool,
                backend: parts.backend,
                fetcher: parts.fetcher,
                ids,
                media,
                blobs,
            }),
        }
    }

    /// Resolve an external key to its resource id.
    ///
    /// Served from the id cache when possible; concurrent calls for the same
    /// key share one walk over the resolution pool.
    #[instrument(skip(self), fields(operation = "resolve_id"))]
    pub async fn resolve_id(&self, key: &str) -> Option<ResourceId> {
        let key = key.trim();
        if key.is_empty() {
            debug!("empty key");
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        self.inner
            .ids
            .obtain(key.to_string(), move || async move { inner.lookup_id(&owned).await })
            .await
    }

    /// Download the media for `id` and return a handle to it.
    ///
    /// The handle stays valid while the entry is in the media cache. Read
    /// the bytes with [`media_bytes`](Self::media_bytes).
    #[instrument(skip(self), fields(operation = "fetch_resource"))]
    pub async fn fetch_resource(&self, id: &ResourceId) -> Option<MediaHandle> {
        let inner = Arc::clone(&self.inner);
        let owned = id.clone();
        self.inner
            .media
            .obtain(id.clone(), move || async move { inner.download(&owned).await })
            .await
    }

    /// Resolve `key`, then fetch its media.
    pub async fn resolve_and_fetch(&self, key: &str) -> Option<(ResourceId, MediaHandle)> {
        let id = self.resolve_id(key).await?;
        let handle = self.fetch_resource(&id).await?;
        Some((id, handle))
    }

    /// The body behind a handle, unless it has been revoked.
    pub fn media_bytes(&self, handle: &MediaHandle) -> Option<Bytes> {
        self.inner.blobs.get(handle)
    }

    /// The registry holding downloaded bodies.
    pub fn blobs(&self) -> &BlobRegistry {
        &self.inner.blobs
    }

    /// The shared penalty store.
    pub fn penalties(&self) -> &Arc<PenaltyStore> {
        self.inner.fetcher.selector().penalties()
    }

    /// Endpoints of `class` in the order the next request would try them.
    pub fn ordered_endpoints(&self, class: RequestClass) -> Vec<Endpoint> {
        self.inner.fetcher.selector().ordered_endpoints(class)
    }

    pub fn pool(&self, class: RequestClass) -> &PoolConfig {
        match class {
            RequestClass::Api => &self.inner.api_pool,
            RequestClass::Media => &self.inner.media_pool,
        }
    }

    /// Operations of `class` currently holding an admission slot.
    pub fn active(&self, class: RequestClass) -> usize {
        match class {
            RequestClass::Api => self.inner.ids.gate().active(),
            RequestClass::Media => self.inner.media.gate().active(),
        }
    }

    /// Keys with a resolution in flight plus ids with a download in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.ids.in_flight() + self.inner.media.in_flight()
    }

    /// Cached id for `key`, without touching the network.
    pub fn cached_id(&self, key: &str) -> Option<ResourceId> {
        self.inner.ids.cache().get(&key.trim().to_string())
    }

    /// Cached handle for `id`, without touching the network.
    pub fn cached_media(&self, id: &ResourceId) -> Option<MediaHandle> {
        self.inner.media.cache().get(id)
    }

    /// Stop the relay.
    ///
    /// Queued requests are released with no result, new requests return
    /// `None`, both caches are cleared, and every media handle is revoked.
    /// Requests already past the limiter may still finish for their
    /// waiters, but their results are not cached. Idempotent.
    pub fn shutdown(&self) {
        let dropped = self.inner.fetcher.limiter().shutdown();
        self.inner.ids.gate().close();
        self.inner.media.gate().close();
        let ids = self.inner.ids.cache().clear();
        let media = self.inner.media.cache().clear();
        let handles = self.inner.blobs.revoke_all();
        info!(dropped, ids, media, handles, "relay shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.fetcher.limiter().is_shut_down()
    }
}

impl RelayInner {
    async fn lookup_id(&self, key: &str) -> Option<ResourceId> {
        let pool = &self.api_pool;
        self.fetcher
            .resolve(key, RequestClass::Api, pool.attempt_timeout(), |base| {
                let url = pool.request_url(&base, key);
                let backend = Arc::clone(&self.backend);
                async move { backend.resolve_id(&url).await }
            })
            .await
    }

    async fn download(&self, id: &ResourceId) -> Option<MediaHandle> {
        let pool = &self.media_pool;
        let min = pool.min_payload_bytes;
        let body = self
            .fetcher
            .resolve(id.as_str(), RequestClass::Media, pool.attempt_timeout(), |base| {
                let url = pool.request_url(&base, id.as_str());
                let backend = Arc::clone(&self.backend);
                async move {
                    let body = backend.fetch_media(&url).await?;
                    if body.len() < min {
                        return Err(MirrorFetchError::UndersizedPayload {
                            size: body.len(),
                            min,
                        });
                    }
                    Ok(body)
                }
            })
            .await?;

        // The relay may have been shut down while the body was in transit.
        if self.fetcher.limiter().is_shut_down() {
            return None;
        }
        let handle = self.blobs.create(body);
        debug!(backend = self.backend.name(), %id, handle = %handle, bytes = handle.len(), "media registered");
        Some(handle)
    }
}
