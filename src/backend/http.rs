//! reqwest-backed mirror client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use super::MirrorBackend;
use crate::types::ResourceId;
use crate::version::version_string;
use crate::{MirrorFetchError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolution payload. Only the first entry's id is used.
#[derive(Debug, Deserialize)]
struct SetResponse {
    #[serde(default)]
    beatmaps: Vec<SetEntry>,
}

#[derive(Debug, Deserialize)]
struct SetEntry {
    id: Option<ResourceId>,
}

/// HTTP client for mirror pools.
///
/// Attempt timeouts are applied by the relay per request class, so the
/// client itself only bounds connection setup.
#[derive(Clone)]
pub struct HttpMirrorBackend {
    http: Client,
}

impl HttpMirrorBackend {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(version_string())
            .build()
            .map_err(|e| MirrorFetchError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Use a preconfigured client (proxies, custom TLS roots).
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    async fn get(&self, url: &str) -> Result<Response> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorFetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MirrorBackend for HttpMirrorBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn resolve_id(&self, url: &str) -> Result<ResourceId> {
        let body = self.get(url).await?.bytes().await?;
        parse_resource_id(&body)
    }

    async fn fetch_media(&self, url: &str) -> Result<Bytes> {
        Ok(self.get(url).await?.bytes().await?)
    }
}

/// Extract `beatmaps[0].id` from a resolution body.
fn parse_resource_id(body: &[u8]) -> Result<ResourceId> {
    let response: SetResponse = serde_json::from_slice(body)?;
    response
        .beatmaps
        .into_iter()
        .next()
        .and_then(|entry| entry.id)
        .ok_or(MirrorFetchError::MissingId)
}
