use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use herobot_core::StorePolicy;
use secrecy::SecretString;
use thiserror::Error;

use crate::{IngestConfig, DEFAULT_PACING};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_STATS_API_BASE: &str = "https://open.api.nexon.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process-wide settings, read once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub slack_bot_token: SecretString,
    pub slack_signing_secret: Option<SecretString>,
    pub slack_api_base: String,
    pub stats_api_key: SecretString,
    pub stats_api_base: String,
    pub database_url: SecretString,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub web_port: u16,
    pub pacing: Duration,
    pub http_timeout: Duration,
    pub store_policy: StorePolicy,
    pub user_agent: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pacing_ms: u64 = parsed(&lookup, "HEROBOT_PACING_MS", DEFAULT_PACING.as_millis() as u64)?;
        if pacing_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "HEROBOT_PACING_MS",
                value: "0".into(),
                reason: "pacing interval must be positive".into(),
            });
        }

        Ok(Self {
            slack_bot_token: required(&lookup, "SLACK_BOT_TOKEN")?,
            slack_signing_secret: optional(&lookup, "SLACK_SIGNING_SECRET").map(SecretString::from),
            slack_api_base: optional(&lookup, "SLACK_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SLACK_API_BASE.to_string()),
            stats_api_key: required(&lookup, "NEXON_API_KEY")?,
            stats_api_base: optional(&lookup, "STATS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_STATS_API_BASE.to_string()),
            database_url: required(&lookup, "DATABASE_URL")?,
            db_max_connections: parsed(&lookup, "HEROBOT_DB_MAX_CONNECTIONS", 5)?,
            bind_addr: optional(&lookup, "HEROBOT_BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port: parsed(&lookup, "HEROBOT_WEB_PORT", 3000)?,
            pacing: Duration::from_millis(pacing_ms),
            http_timeout: Duration::from_secs(parsed(&lookup, "HEROBOT_HTTP_TIMEOUT_SECS", 20)?),
            store_policy: parsed(&lookup, "HEROBOT_STORE_POLICY", StorePolicy::Always)?,
            user_agent: optional(&lookup, "HEROBOT_USER_AGENT")
                .unwrap_or_else(|| "herobot/0.1".to_string()),
        })
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            pacing: self.pacing,
            store_policy: self.store_policy,
            ..IngestConfig::default()
        }
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .map(SecretString::from)
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}
