//! Environment-derived server configuration.
//!
//! All variables carry the `DURABLE_MCP_` prefix. Local mode switches to the
//! in-memory store and a random port; otherwise a storage endpoint is
//! required. Credentials are a pair; supplying only one is a config error.

use std::time::Duration;

use thiserror::Error;

use crate::phase::PhaseManagerConfig;
use crate::pipeline::DEFAULT_REQUEST_DEADLINE;
use crate::stages::dispatch::DEFAULT_VERSION_PARAM;

pub const ENV_PREFIX: &str = "DURABLE_MCP_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is required unless {prefix}LOCAL=true", prefix = ENV_PREFIX)]
    MissingStorageUrl { var: String },

    #[error("{prefix}STORAGE_ACCOUNT and {prefix}STORAGE_KEY must be set together", prefix = ENV_PREFIX)]
    UnpairedCredentials,

    #[error("{var} has an invalid value: {message}")]
    Invalid { var: String, message: String },
}

/// Server configuration, fully resolved before the app is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Zero picks a random port (always the case in local mode).
    pub port: u16,
    /// In-memory store, no external dependencies.
    pub local: bool,
    pub storage_url: Option<String>,
    pub storage_account: Option<String>,
    pub storage_key: Option<String>,
    /// When set, the Authorization header must equal this value.
    pub shared_key: Option<String>,
    /// Tenant all requests of this deployment are attributed to.
    pub tenant: String,
    /// Prefix for tenant bucket names in the object store.
    pub bucket_prefix: String,
    pub request_deadline: Duration,
    /// Requests admitted per second; zero disables throttling.
    pub throttle_limit: u32,
    /// How long the health probe fails before in-flight work is cancelled.
    pub drain_delay: Duration,
    pub api_version_param: String,
    pub phase: PhaseManagerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            local: true,
            storage_url: None,
            storage_account: None,
            storage_key: None,
            shared_key: None,
            tenant: "default".to_string(),
            bucket_prefix: "toolcalls".to_string(),
            request_deadline: DEFAULT_REQUEST_DEADLINE,
            throttle_limit: 100,
            drain_delay: Duration::from_secs(5),
            api_version_param: DEFAULT_VERSION_PARAM.to_string(),
            phase: PhaseManagerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary variable source; the seam the env tests use.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut config = Self::default();

        config.local = match var("LOCAL").as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") | None => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: format!("{ENV_PREFIX}LOCAL"),
                    message: format!("expected true/false, got {other:?}"),
                })
            }
        };
        config.storage_url = var("STORAGE_URL");
        config.storage_account = var("STORAGE_ACCOUNT");
        config.storage_key = var("STORAGE_KEY");
        config.shared_key = var("SHARED_KEY");
        if let Some(tenant) = var("TENANT") {
            config.tenant = tenant;
        }
        if let Some(prefix) = var("BUCKET_PREFIX") {
            config.bucket_prefix = prefix;
        }
        if let Some(port) = var("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                var: format!("{ENV_PREFIX}PORT"),
                message: format!("expected a port number, got {port:?}"),
            })?;
        }
        if let Some(limit) = var("THROTTLE_LIMIT") {
            config.throttle_limit = limit.parse().map_err(|_| ConfigError::Invalid {
                var: format!("{ENV_PREFIX}THROTTLE_LIMIT"),
                message: format!("expected a number, got {limit:?}"),
            })?;
        }

        if config.local {
            // Local mode: in-memory store, random port.
            config.port = 0;
        } else if config.storage_url.is_none() {
            return Err(ConfigError::MissingStorageUrl {
                var: format!("{ENV_PREFIX}STORAGE_URL"),
            });
        }
        if config.storage_account.is_some() != config.storage_key.is_some() {
            return Err(ConfigError::UnpairedCredentials);
        }
        Ok(config)
    }
}
