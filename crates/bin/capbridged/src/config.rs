//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `capbridge.toml` in the working directory, or the file named by
//! `CAPBRIDGE_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use capbridge_adapter_platform_reqwest::PlatformConfig;
use capbridge_app::services::capability_resolver::ResolverConfig;
use capbridge_app::services::crash_loop::CrashLoopConfig;
use capbridge_app::services::device_synchronizer::SyncConfig;
use capbridge_app::services::discovery::{DiscoveryConfig, PollingPlan};
use capbridge_app::services::token_store::TokenPolicy;
use capbridge_domain::adapter::AdapterKind;
use capbridge_domain::error::ValidationError;
use capbridge_domain::time;
use capbridge_domain::token::{MAX_TOKEN_LIFETIME, TokenRecord};

const SECONDS_PER_DAY: u64 = 86_400;

/// Longest accepted crash-loop window.
const MAX_CRASH_WINDOW: Duration = Duration::from_secs(30 * SECONDS_PER_DAY);

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Remote platform endpoints and OAuth client.
    pub platform: PlatformConfig,
    /// Bootstrap credential and token monitor.
    pub auth: AuthConfig,
    /// Synchronizer timings.
    pub polling: PollingConfig,
    pub crash_loop: CrashLoopConfig,
    pub resolver: ResolverConfig,
    pub discovery: DiscoveryConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Credential settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access token used when nothing is stored yet.
    pub access_token: Option<String>,
    /// Refresh token paired with `access_token`.
    pub refresh_token: Option<String>,
    /// Lifetime granted to a refresh token on every exchange, in days.
    pub refresh_token_lifetime_days: u32,
    /// Period of the background token monitor, in seconds.
    pub monitor_interval_secs: u64,
}

/// Device polling.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Default polling period, in seconds.
    pub interval_secs: u64,
    /// Per adapter kind overrides, in seconds.
    pub intervals: BTreeMap<AdapterKind, u64>,
    pub staleness_secs: u64,
    pub failure_threshold: u32,
    pub offline_cooldown_secs: u64,
    pub command_settle_secs: u64,
    pub max_jitter_ms: u64,
    /// Rely on pushed events instead of polling.
    pub event_push: bool,
}

impl Config {
    /// Load configuration from `capbridge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CAPBRIDGE_CONFIG").unwrap_or_else(|_| "capbridge.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAPBRIDGE_HOST") {
            self.server.host = val;
        }
        if let Some(port) = std::env::var("CAPBRIDGE_PORT")
            .ok()
            .and_then(|val| val.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("CAPBRIDGE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("CAPBRIDGE_CLIENT_ID") {
            self.platform.client_id = val;
        }
        if let Ok(val) = std::env::var("CAPBRIDGE_CLIENT_SECRET") {
            self.platform.client_secret = val;
        }
        if let Ok(val) = std::env::var("CAPBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.polling.interval_secs == 0 || self.polling.intervals.values().any(|v| *v == 0) {
            return Err(ConfigError::Validation(
                "polling interval must be non-zero".to_string(),
            ));
        }
        if self.polling.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "failure threshold must be non-zero".to_string(),
            ));
        }
        if self.auth.monitor_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "token monitor interval must be non-zero".to_string(),
            ));
        }
        if self.auth.refresh_token_lifetime_days == 0
            || i64::from(self.auth.refresh_token_lifetime_days) > MAX_TOKEN_LIFETIME.num_days()
        {
            return Err(ConfigError::Validation(format!(
                "refresh token lifetime must be between 1 and {} days",
                MAX_TOKEN_LIFETIME.num_days()
            )));
        }
        if self.crash_loop.window.is_zero() || self.crash_loop.window > MAX_CRASH_WINDOW {
            return Err(ConfigError::Validation(format!(
                "crash loop window must be between 1 and {} seconds",
                MAX_CRASH_WINDOW.as_secs()
            )));
        }
        if self.crash_loop.max_failures == 0 {
            return Err(ConfigError::Validation(
                "crash loop count must be non-zero".to_string(),
            ));
        }
        if self.discovery.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "discovery attempts must be non-zero".to_string(),
            ));
        }
        if self.auth.access_token.is_some() != self.auth.refresh_token.is_some() {
            return Err(ConfigError::Validation(
                "access_token and refresh_token must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Credential from the `[auth]` section, if both tokens are set.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a token is empty.
    pub fn bootstrap_token(&self) -> Result<Option<TokenRecord>, ValidationError> {
        match (&self.auth.access_token, &self.auth.refresh_token) {
            (Some(access), Some(refresh)) => {
                TokenRecord::bootstrap(access.as_str(), refresh.as_str(), time::now()).map(Some)
            }
            _ => Ok(None),
        }
    }

    #[must_use]
    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            refresh_token_lifetime: time::delta(Duration::from_secs(
                u64::from(self.auth.refresh_token_lifetime_days) * SECONDS_PER_DAY,
            )),
            monitor_interval: Duration::from_secs(self.auth.monitor_interval_secs),
        }
    }

    #[must_use]
    pub fn polling_plan(&self) -> PollingPlan {
        let polling = &self.polling;
        PollingPlan {
            defaults: SyncConfig {
                polling_interval: Duration::from_secs(polling.interval_secs),
                staleness: Duration::from_secs(polling.staleness_secs),
                failure_threshold: polling.failure_threshold,
                offline_cooldown: Duration::from_secs(polling.offline_cooldown_secs),
                command_settle: Duration::from_secs(polling.command_settle_secs),
                max_jitter: Duration::from_millis(polling.max_jitter_ms),
                event_push: polling.event_push,
            },
            intervals: polling
                .intervals
                .iter()
                .map(|(kind, secs)| (*kind, Duration::from_secs(*secs)))
                .collect(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:capbridge.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "capbridged=info,capbridge=info,tower_http=info".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            refresh_token_lifetime_days: 30,
            monitor_interval_secs: 60,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            interval_secs: defaults.polling_interval.as_secs(),
            intervals: BTreeMap::new(),
            staleness_secs: defaults.staleness.as_secs(),
            failure_threshold: defaults.failure_threshold,
            offline_cooldown_secs: defaults.offline_cooldown.as_secs(),
            command_settle_secs: defaults.command_settle.as_secs(),
            max_jitter_ms: u64::try_from(defaults.max_jitter.as_millis()).unwrap_or(u64::MAX),
            event_push: defaults.event_push,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
