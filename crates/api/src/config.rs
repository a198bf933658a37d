//! Server Configuration
//!
//! Loaded from an optional `anytools.toml` (or any format the `config` crate
//! detects from the file extension) and overridden by environment variables
//! such as `ANYTOOLS__SERVER__ADDR=0.0.0.0:9090`.

use crate::rate_limit::RateLimitConfig;
use alerting::AlertConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const ENV_PREFIX: &str = "ANYTOOLS";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
    pub notifier: NotifierConfig,
    pub mock: MockConfig,
    /// Relay groups: ordered providers tried for `/api/v1/relay/{group}`
    pub providers: HashMap<String, Vec<ProviderConfig>>,
}

impl AppConfig {
    /// Load `path` (extension optional, file optional) plus environment overrides
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Alerts are POSTed here when set, otherwise only logged
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
    pub throttle: AlertConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 5000,
            throttle: AlertConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Definition lifetime; 0 keeps definitions forever
    pub ttl_days: u64,
    /// How often expired definitions are purged
    pub purge_interval_secs: u64,
}

impl MockConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_days > 0).then(|| Duration::from_secs(self.ttl_days * 24 * 60 * 60))
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            purge_interval_secs: 600,
        }
    }
}

/// One outbound provider in a relay group
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}
