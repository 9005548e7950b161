//! Process configuration read from the environment (after `dotenvy` has loaded `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    /// Further verifications allowed after an indeterminate one.
    pub retry_limit: u32,
    /// Delay of the single fallback re-check.
    pub retry_delay: Duration,
    /// Undecided sessions older than this are dropped; their orders stay pending.
    pub session_ttl: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { retry_limit: 1, retry_delay: Duration::from_millis(5_000), session_ttl: Duration::from_secs(1_800) }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub currency: String,
    pub admin_token: String,
    pub support_link: String,
    pub gateway: GatewayConfig,
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ReconcileConfig::default();
        Ok(Self {
            port: parsed("PORT")?.unwrap_or(8083),
            database_url: optional("DATABASE_URL"),
            nats_url: optional("NATS_URL"),
            currency: optional("CURRENCY").unwrap_or_else(|| "GHS".to_string()).to_uppercase(),
            admin_token: required("ADMIN_TOKEN")?,
            support_link: optional("SUPPORT_LINK").unwrap_or_else(|| "https://wa.me/".to_string()),
            gateway: GatewayConfig {
                base_url: optional("GATEWAY_BASE_URL").unwrap_or_else(|| "https://api.paystack.co".to_string()),
                secret_key: required("GATEWAY_SECRET_KEY")?,
                timeout: Duration::from_millis(parsed("GATEWAY_TIMEOUT_MS")?.unwrap_or(15_000)),
            },
            reconcile: ReconcileConfig {
                retry_limit: parsed("VERIFY_RETRY_LIMIT")?.unwrap_or(defaults.retry_limit),
                retry_delay: parsed("VERIFY_RETRY_DELAY_MS")?.map(Duration::from_millis).unwrap_or(defaults.retry_delay),
                session_ttl: parsed("SESSION_TTL_SECS")?.map(Duration::from_secs).unwrap_or(defaults.session_ttl),
            },
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    optional(name)
        .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }))
        .transpose()
}
