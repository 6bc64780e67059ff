//! Stats API fetch + Postgres persistence for herobot.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use herobot_core::{FetchOutcome, StatRecord, DATE_FORMAT};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{debug, warn, Instrument};

pub use sqlx::postgres::PgPool;

pub const CRATE_NAME: &str = "herobot-storage";

pub const STAT_ENDPOINT_PATH: &str = "/maplestory/v1/character/stat";
pub const API_KEY_HEADER: &str = "x-nxopen-api-key";

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("stats request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("stats response (http {status}) is not JSON: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One stats lookup per (entity, date). Implementations must not retry.
#[async_trait]
pub trait StatSource: Send + Sync {
    async fn fetch(&self, ocid: &str, date: NaiveDate) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
pub trait StatSink: Send + Sync {
    async fn write(&self, record: &StatRecord) -> Result<(), StorageError>;
}

#[derive(Debug)]
pub struct StatFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl StatFetcher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        config: HttpClientConfig,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), STAT_ENDPOINT_PATH)
    }
}

#[async_trait]
impl StatSource for StatFetcher {
    async fn fetch(&self, ocid: &str, date: NaiveDate) -> Result<FetchOutcome, FetchError> {
        let date = date.format(DATE_FORMAT).to_string();
        let span = tracing::info_span!("stat_fetch", ocid, date = %date);

        async {
            let resp = self
                .client
                .get(self.endpoint())
                .header(API_KEY_HEADER, self.api_key.expose_secret())
                .query(&[("ocid", ocid), ("date", date.as_str())])
                .send()
                .await?;

            let success = resp.status().is_success();
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            let payload = if body.is_empty() {
                JsonValue::Null
            } else {
                match serde_json::from_slice(&body) {
                    Ok(payload) => payload,
                    // Gateway pages and plain-text throttling replies are kept verbatim.
                    Err(_) if !success => JsonValue::String(String::from_utf8_lossy(&body).into_owned()),
                    Err(source) => return Err(FetchError::Decode { status, source }),
                }
            };

            let outcome = FetchOutcome::from_status(status, payload);
            if outcome.is_success() {
                debug!(status, "stats api responded");
            } else {
                warn!(status, "stats api returned non-success status");
            }
            Ok::<_, FetchError>(outcome)
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct PgStatSink {
    pool: PgPool,
}

impl PgStatSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatSink for PgStatSink {
    async fn write(&self, record: &StatRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO hero_stats (ocid, stat_date, upstream_status, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.ocid)
        .bind(record.date)
        .bind(i32::from(record.upstream_status))
        .bind(&record.payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn connect_pool(database_url: &SecretString, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
