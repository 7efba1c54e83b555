//! Registry of downloaded media bodies addressed by handle URL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::debug;

use crate::types::MediaHandle;

const HANDLE_SCHEME: &str = "blob:mirrorfetch/";

/// Process-level store behind [`MediaHandle`]s.
///
/// Each registered body stays alive until its handle is revoked. The media
/// cache revokes handles as entries leave it, so the registry never holds
/// more bodies than the cache has entries plus the handles callers created
/// themselves.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    blobs: Mutex<HashMap<Arc<str>, Bytes>>,
    next_id: AtomicU64,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body and return a fresh handle to it.
    pub fn create(&self, data: Bytes) -> MediaHandle {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url: Arc<str> = Arc::from(format!("{HANDLE_SCHEME}{n}"));
        let handle = MediaHandle::new(Arc::clone(&url), data.len());
        self.lock().insert(url, data);
        handle
    }

    /// The body behind a handle, if it has not been revoked.
    pub fn get(&self, handle: &MediaHandle) -> Option<Bytes> {
        self.get_url(handle.url())
    }

    /// The body behind a handle URL, if it has not been revoked.
    pub fn get_url(&self, url: &str) -> Option<Bytes> {
        self.lock().get(url).cloned()
    }

    /// Release a handle. Returns whether it was still registered.
    pub fn revoke(&self, handle: &MediaHandle) -> bool {
        let released = self.lock().remove(handle.url()).is_some();
        if released {
            debug!(handle = handle.url(), "media handle revoked");
        }
        released
    }

    /// Release every handle. Returns how many were registered.
    pub fn revoke_all(&self) -> usize {
        let mut blobs = self.lock();
        let count = blobs.len();
        blobs.clear();
        count
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Arc<str>, Bytes>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
