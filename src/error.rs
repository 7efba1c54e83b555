//! mirrorfetch error types

use std::time::Duration;

/// mirrorfetch error types
///
/// These never cross [`Relay::resolve_id`](crate::Relay::resolve_id) or
/// [`Relay::fetch_resource`](crate::Relay::fetch_resource); they describe why a
/// single endpoint attempt, a persistence call, or a configuration step failed.
#[derive(Debug, thiserror::Error)]
pub enum MirrorFetchError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    // Payload errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response carried no resource id")]
    MissingId,

    #[error("payload too small: {size} bytes (minimum {min})")]
    UndersizedPayload { size: usize, min: usize },

    // Persistence errors
    #[error("penalty table error: {0}")]
    Persistence(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no endpoints configured for {0} requests")]
    NoEndpoints(&'static str),

    // Lifecycle
    #[error("relay is shut down")]
    Shutdown,
}

impl MirrorFetchError {
    /// Whether this error means "this endpoint failed now".
    ///
    /// Transport and payload failures are endpoint failures: they are recovered
    /// locally by moving on to the next endpoint and raising its penalty.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Status { .. }
                | Self::Timeout(_)
                | Self::Json(_)
                | Self::MissingId
                | Self::UndersizedPayload { .. }
        )
    }
}

impl From<reqwest::Error> for MirrorFetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            MirrorFetchError::Status {
                status: status.as_u16(),
            }
        } else {
            MirrorFetchError::Http(err.to_string())
        }
    }
}

/// Result type alias for mirrorfetch operations
pub type Result<T> = std::result::Result<T, MirrorFetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_payload_errors_are_endpoint_failures() {
        assert!(MirrorFetchError::Http("reset".into()).is_endpoint_failure());
        assert!(MirrorFetchError::Status { status: 500 }.is_endpoint_failure());
        assert!(MirrorFetchError::Timeout(Duration::from_secs(5)).is_endpoint_failure());
        assert!(MirrorFetchError::MissingId.is_endpoint_failure());
        assert!(
            MirrorFetchError::UndersizedPayload { size: 12, min: 1000 }.is_endpoint_failure()
        );
    }

    #[test]
    fn lifecycle_and_config_errors_are_not_endpoint_failures() {
        assert!(!MirrorFetchError::Shutdown.is_endpoint_failure());
        assert!(!MirrorFetchError::Persistence("disk full".into()).is_endpoint_failure());
        assert!(!MirrorFetchError::NoEndpoints("api").is_endpoint_failure());
    }

    #[test]
    fn display_includes_sizes() {
        let err = MirrorFetchError::UndersizedPayload { size: 50, min: 1000 };
        assert_eq!(err.to_string(), "payload too small: 50 bytes (minimum 1000)");
    }
}
