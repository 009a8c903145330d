//! Configuration loading and management.
//!
//! Supports TOML configuration files with environment variable overrides.
//! Environment variables follow the pattern: `COURIER_<SECTION>_<KEY>`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Default Expo push API endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Push gateway configuration.
    pub gateway: GatewayConfig,

    /// Retry policy configuration.
    pub retry: RetryPolicyConfig,

    /// Fan-out dispatch configuration.
    pub dispatch: DispatchConfig,

    /// Health check server configuration.
    pub health: HealthConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Push gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Push gateway endpoint URL.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Notification sound sent with every message.
    #[serde(default = "default_sound")]
    pub sound: String,
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sound() -> String {
    "default".to_string()
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicyConfig {
    /// Maximum number of retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in seconds; delays grow as `base * 2^n`.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    2
}

/// Fan-out dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum concurrent in-flight deliveries per dispatch call.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_shutdown_timeout() -> u64 {
    10
}

/// Health check server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Whether the health check server is enabled.
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,

    /// Bind address for the health check server.
    #[serde(default = "default_health_bind_address")]
    pub bind_address: String,
}

fn default_health_enabled() -> bool {
    true
}

fn default_health_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error", "off".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl AppConfig {
    /// Load configuration from a file path with environment variable overrides.
    ///
    /// Environment variables follow the pattern: `COURIER_<SECTION>_<KEY>`
    /// For example: `COURIER_GATEWAY_URL`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::builder_with_defaults()?
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("COURIER")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from environment variables only (no config file).
    pub fn from_env() -> Result<Self> {
        let config = Self::builder_with_defaults()?
            .add_source(
                Environment::with_prefix("COURIER")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("gateway.url", DEFAULT_GATEWAY_URL)?
            .set_default("gateway.request_timeout_secs", 30)?
            .set_default("gateway.sound", "default")?
            .set_default("retry.max_retries", 3)?
            .set_default("retry.backoff_base_secs", 2)?
            .set_default("dispatch.max_concurrent", 16)?
            .set_default("dispatch.shutdown_timeout_secs", 10)?
            .set_default("health.enabled", true)?
            .set_default("health.bind_address", "0.0.0.0:8080")?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?)
    }
}

impl GatewayConfig {
    /// Per-request HTTP timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RetryPolicyConfig {
    /// Base backoff duration.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}
