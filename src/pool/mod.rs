//! Mirror endpoint pools.
//!
//! A pool is a fixed, ordered list of mirror base URLs plus the path
//! template used to build request URLs from a key or id. The configured
//! order is the tie-breaker when penalties are equal, so list the mirrors
//! you trust most first.
//!
//! ```toml
//! [api]
//! endpoints = ["https://catboy.best", "https://central.catboy.best"]
//! path = "/api/v2/s/{key}"
//! timeout_ms = 5000
//! ```

mod selector;

pub use selector::EndpointSelector;

use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Default resolution mirrors, in priority order.
pub const DEFAULT_API_ENDPOINTS: &[&str] = &[
    "https://catboy.best",
    "https://central.catboy.best",
    "https://us.catboy.best",
    "https://sg.catboy.best",
];

/// Default media mirrors, in priority order.
pub const DEFAULT_MEDIA_ENDPOINTS: &[&str] = &[
    "https://us.catboy.best",
    "https://sg.catboy.best",
    "https://catboy.best",
    "https://central.catboy.best",
];

/// Default resolution path. `{key}` is replaced with the external key.
pub const DEFAULT_API_PATH: &str = "/api/v2/s/{key}";

/// Default media path. `{id}` is replaced with the resolved id.
pub const DEFAULT_MEDIA_PATH: &str = "/preview/audio/{id}/full";

/// Default minimum media body size in bytes.
pub const DEFAULT_MIN_MEDIA_BYTES: usize = 1000;

/// Bytes escaped when a key or id is spliced into a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One class's endpoint pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Mirror base URLs in priority order.
    pub endpoints: Vec<String>,
    /// Path template appended to the base URL.
    pub path: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Bodies shorter than this are treated as failures. 0 disables the check.
    pub min_payload_bytes: usize,
}

impl PoolConfig {
    /// Pool with the given endpoints and path, 10 s timeout, no size check.
    pub fn new<I, S>(endpoints: I, path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            path: path.into(),
            timeout_ms: 10_000,
            min_payload_bytes: 0,
        }
    }

    /// The default pool for a request class.
    pub fn default_for(class: RequestClass) -> Self {
        match class {
            RequestClass::Api => {
                Self::new(DEFAULT_API_ENDPOINTS.iter().copied(), DEFAULT_API_PATH)
                    .timeout(Duration::from_secs(5))
            }
            RequestClass::Media => {
                Self::new(DEFAULT_MEDIA_ENDPOINTS.iter().copied(), DEFAULT_MEDIA_PATH)
                    .timeout(Duration::from_secs(10))
                    .min_payload_bytes(DEFAULT_MIN_MEDIA_BYTES)
            }
        }
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the minimum accepted body size.
    pub fn min_payload_bytes(mut self, bytes: usize) -> Self {
        self.min_payload_bytes = bytes;
        self
    }

    /// Per-attempt timeout as a [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the request URL for `value` on mirror `base`.
    ///
    /// Both `{key}` and `{id}` placeholders are substituted with `value`
    /// percent-encoded as a single path segment.
    pub fn request_url(&self, base: &str, value: &str) -> String {
        let segment = utf8_percent_encode(value, PATH_SEGMENT).to_string();
        let path = self.path.replace("{key}", &segment).replace("{id}", &segment);
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    /// Reject pools that can never succeed.
    pub fn validate(&self, class: RequestClass) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(MirrorFetchError::NoEndpoints(class.as_str()));
        }
        if self.timeout_ms == 0 {
            return Err(MirrorFetchError::Configuration(format!(
                "{class} pool timeout must be greater than zero"
            )));
        }
        if !self.path.contains("{key}") && !self.path.contains("{id}") {
            return Err(MirrorFetchError::Configuration(format!(
                "{class} path '{}' has no {{key}} or {{id}} placeholder",
                self.path
            )));
        }
        Ok(())
    }
}
