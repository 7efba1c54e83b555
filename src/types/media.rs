//! Handles to downloaded media.

use std::fmt;
use std::sync::Arc;

/// Reusable reference to a downloaded media body.
///
/// Works like a browser object URL: the handle is a cheap string reference,
/// and the bytes stay registered in the [`BlobRegistry`](crate::cache::BlobRegistry)
/// until the handle is revoked. Revocation happens when the media cache
/// evicts or clears the entry; after that [`BlobRegistry::get`](crate::cache::BlobRegistry::get)
/// returns `None` for the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle {
    url: Arc<str>,
    len: usize,
}

impl MediaHandle {
    pub(crate) fn new(url: impl Into<Arc<str>>, len: usize) -> Self {
        Self {
            url: url.into(),
            len,
        }
    }

    /// The handle's URL, e.g. `blob:mirrorfetch/7`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Size of the referenced body in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
