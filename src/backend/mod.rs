//! Mirror transport.
//!
//! [`MirrorBackend`] is the seam between the relay and the network. The
//! relay builds full request URLs from the pool's path template and hands
//! them to the backend; timeouts, failover, and penalties stay on the relay
//! side, so a backend only has to perform one request and classify the
//! outcome.

mod http;

pub use http::HttpMirrorBackend;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::types::ResourceId;

/// One request against one mirror.
///
/// Any error returned here counts as a failure of that mirror.
#[async_trait]
pub trait MirrorBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Resolve an external key through the resolution endpoint at `url`.
    async fn resolve_id(&self, url: &str) -> Result<ResourceId>;

    /// Download the media body at `url`.
    async fn fetch_media(&self, url: &str) -> Result<Bytes>;
}
