//! TOML configuration for relays.
//!
//! Resolution order:
//! 1. `--config <path>` (explicit; must exist)
//! 2. `~/.mirrorfetch/config.toml` (user)
//! 3. `/etc/mirrorfetch/config.toml` (system)
//!
//! When neither standard file exists the defaults are used. Every key is
//! optional:
//!
//! ```toml
//! [limits]
//! max_concurrent = 3
//! cache_max_entries = 300
//!
//! [rate_limit]
//! max_requests_per_second = 3.0
//!
//! [penalties]
//! path = "/var/cache/mirrorfetch/penalties.json"
//! max = 50
//! success_delta = -1
//! failure_delta = 2
//!
//! [api]
//! endpoints = ["https://catboy.best", "https://central.catboy.best"]
//! timeout_ms = 5000
//!
//! [media]
//! path = "/preview/audio/{id}/full"
//! min_payload_bytes = 1000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::gateway::MirrorFetchBuilder;
use crate::limits::{LimitsConfig, RateLimitConfig};
use crate::penalty::PenaltyPolicy;
use crate::pool::PoolConfig;
use crate::types::RequestClass;
use crate::{MirrorFetchError, Result};

/// Relay configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub penalties: PenaltiesSection,
    #[serde(default)]
    pub api: PoolSection,
    #[serde(default)]
    pub media: PoolSection,
}

/// `[penalties]`: where the table lives and how it moves.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PenaltiesSection {
    /// Penalty file (default: `~/.cache/mirrorfetch/penalties.json`).
    pub path: Option<PathBuf>,
    /// Keep penalties in memory only; `path` is ignored.
    #[serde(default)]
    pub in_memory: bool,
    pub max: Option<u32>,
    pub success_delta: Option<i32>,
    pub failure_delta: Option<i32>,
}

impl PenaltiesSection {
    pub fn policy(&self) -> PenaltyPolicy {
        let defaults = PenaltyPolicy::default();
        PenaltyPolicy {
            max: self.max.unwrap_or(defaults.max),
            success_delta: self.success_delta.unwrap_or(defaults.success_delta),
            failure_delta: self.failure_delta.unwrap_or(defaults.failure_delta),
        }
    }
}

/// `[api]` / `[media]`: overrides on top of the class's default pool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSection {
    pub endpoints: Option<Vec<String>>,
    pub path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub min_payload_bytes: Option<usize>,
}

impl PoolSection {
    /// The default pool for `class` with this section's overrides applied.
    pub fn resolve(&self, class: RequestClass) -> PoolConfig {
        let mut pool = PoolConfig::default_for(class);
        if let Some(endpoints) = &self.endpoints {
            pool.endpoints = endpoints.clone();
        }
        if let Some(path) = &self.path {
            pool.path = path.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            pool.timeout_ms = timeout_ms;
        }
        if let Some(min) = self.min_payload_bytes {
            pool.min_payload_bytes = min;
        }
        pool
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path that does not exist is an error; missing standard
    /// files fall back to [`Config::default`].
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MirrorFetchError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MirrorFetchError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MirrorFetchError::Configuration(format!("invalid config: {e}")))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MirrorFetchError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mirrorfetch").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mirrorfetch/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply this configuration to a builder.
    pub fn apply(&self, builder: MirrorFetchBuilder) -> MirrorFetchBuilder {
        let builder = builder
            .api_pool(self.api.resolve(RequestClass::Api))
            .media_pool(self.media.resolve(RequestClass::Media))
            .limits(self.limits)
            .rate_limit(self.rate_limit)
            .penalty_policy(self.penalties.policy());

        if self.penalties.in_memory {
            builder.in_memory_penalties()
        } else if let Some(path) = &self.penalties.path {
            builder.penalty_file(path.clone())
        } else {
            builder
        }
    }

    /// A builder preconfigured from this file.
    pub fn builder(&self) -> MirrorFetchBuilder {
        self.apply(crate::MirrorFetch::builder())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.penalties.policy(), PenaltyPolicy::default());
        assert_eq!(
            config.api.resolve(RequestClass::Api),
            PoolConfig::default_for(RequestClass::Api)
        );
    }

    #[test]
    fn pool_overrides_merge_onto_defaults() {
        let config = Config::from_toml_str(
            r#"
            [media]
            endpoints = ["https://mirror.example"]
            timeout_ms = 2500
            "#,
        )
        .unwrap();

        let media = config.media.resolve(RequestClass::Media);
        assert_eq!(media.endpoints, ["https://mirror.example"]);
        assert_eq!(media.attempt_timeout(), Duration::from_millis(2500));
        assert_eq!(media.min_payload_bytes, 1000);
        assert_eq!(media.path, "/preview/audio/{id}/full");
    }

    #[test]
    fn penalty_section() {
        let config = Config::from_toml_str(
            r#"
            [penalties]
            in_memory = true
            max = 20
            "#,
        )
        .unwrap();
        assert!(config.penalties.in_memory);
        assert_eq!(config.penalties.policy(), PenaltyPolicy::new().max(20));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("[api]\ntimeout = 4").is_err());
        assert!(Config::from_toml_str("[proxy]\nurl = \"x\"").is_err());
        assert!(Config::from_toml_str("[limits]\nmax_concurent = 4").is_err());
        assert!(Config::from_toml_str("[rate_limit]\nrps = 4.0").is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/mirrorfetch.toml"))).unwrap_err();
        assert!(matches!(err, MirrorFetchError::Configuration(_)));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[limits]\nmax_concurrent = 5\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.limits.max_concurrent, 5);
        assert_eq!(config.limits.cache_max_entries, 300);
    }
}
