//! Caching subsystem.
//!
//! - [`ResultCache`]: bounded insertion-order cache shared by concurrent
//!   callers. The relay keeps one per request class: external key →
//!   [`ResourceId`](crate::ResourceId) and resource id →
//!   [`MediaHandle`](crate::MediaHandle).
//!
//! - [`BlobRegistry`]: owns the bytes behind media handles. The media
//!   cache's eviction listener revokes handles, so cache churn never leaks
//!   bodies.

mod blob;
mod result;

pub use blob::BlobRegistry;
pub use result::{DEFAULT_CACHE_MAX_ENTRIES, RemovalCause, ResultCache};
