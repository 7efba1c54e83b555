//! Endpoint and request class types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The category of request an endpoint pool serves.
///
/// Each class has its own endpoint pool, penalties, cache, and concurrency
/// gate. Serialized as `"api"` / `"media"` in the penalty table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    /// Resolving an external key to a server-side resource id.
    Api,
    /// Fetching the binary media for a resource id.
    Media,
}

impl RequestClass {
    /// Both classes, in a stable order.
    pub const ALL: [RequestClass; 2] = [RequestClass::Api, RequestClass::Media];

    /// Label used in logs, metrics and the penalty table.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Api => "api",
            RequestClass::Media => "media",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mirror of a redundant pool, with its current penalty for a class.
///
/// Lower penalty is preferred. Penalties live in
/// [`PenaltyStore`](crate::penalty::PenaltyStore); an `Endpoint` is a
/// snapshot taken when the pool is ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Mirror base URL (e.g. `https://catboy.best`).
    pub url: String,
    /// Penalty at the time of the snapshot.
    pub penalty: u32,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, penalty: u32) -> Self {
        Self {
            url: url.into(),
            penalty,
        }
    }
}
