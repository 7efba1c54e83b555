//! mirrorfetch - resilient resolve-then-fetch over redundant mirror pools
//!
//! A [`Relay`] turns an external key into a resource id through one pool of
//! mirrors, then downloads the media for that id through a second pool.
//! Each pool is tried best-first by a persistent per-endpoint penalty, every
//! outgoing request is paced by one global rate limiter, identical
//! concurrent requests share a single network sequence, and results are kept
//! in bounded per-class caches.
//!
//! Failures never surface as errors: both operations return `None` when
//! every mirror in the pool failed.
//!
//! # Example
//!
//! ```rust,no_run
//! use mirrorfetch::MirrorFetch;
//!
//! #[tokio::main]
//! async fn main() -> mirrorfetch::Result<()> {
//!     let relay = MirrorFetch::builder()
//!         .max_concurrent(3)
//!         .max_requests_per_second(3.0)
//!         .build()?;
//!
//!     if let Some(id) = relay.resolve_id("1234567").await {
//!         if let Some(handle) = relay.fetch_resource(&id).await {
//!             let bytes = relay.media_bytes(&handle).unwrap_or_default();
//!             println!("{id}: {} bytes at {handle}", bytes.len());
//!         }
//!     }
//!
//!     relay.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Custom mirrors
//!
//! ```rust
//! use std::time::Duration;
//! use mirrorfetch::{MirrorFetch, PoolConfig};
//!
//! let relay = MirrorFetch::builder()
//!     .api_pool(
//!         PoolConfig::new(["https://a.example", "https://b.example"], "/api/v2/s/{key}")
//!             .timeout(Duration::from_secs(3)),
//!     )
//!     .in_memory_penalties()
//!     .build()
//!     .unwrap();
//! assert_eq!(relay.ordered_endpoints(mirrorfetch::RequestClass::Api).len(), 2);
//! ```

pub mod backend;
pub mod cache;
#[cfg(feature = "config")]
pub mod config;
pub mod dedup;
pub mod error;
pub mod failover;
pub mod gateway;
pub mod limits;
pub mod penalty;
pub mod pool;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use backend::{HttpMirrorBackend, MirrorBackend};
pub use error::{MirrorFetchError, Result};
pub use gateway::{MirrorFetch, MirrorFetchBuilder, Relay};
pub use limits::{LimitsConfig, RateLimitConfig};
pub use penalty::{PenaltyBackend, PenaltyPolicy, PenaltyStore};
pub use pool::PoolConfig;
pub use types::{Endpoint, MediaHandle, RequestClass, ResourceId};
pub use version::{PKG_NAME, PKG_VERSION, version_string};

#[cfg(feature = "config")]
pub use config::Config;
