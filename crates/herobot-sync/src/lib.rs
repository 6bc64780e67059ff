//! Paced weekly stat ingestion: walk the range, fetch once per week, persist each response.

mod config;
mod pacer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Weekday};
use herobot_core::{DateRange, IngestionResult, StatRecord, StorePolicy, ValidationError};
use herobot_storage::{
    FetchError, HttpClientConfig, PgPool, PgStatSink, StatFetcher, StatSink, StatSource, StorageError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

pub use config::{ConfigError, ServiceConfig, DEFAULT_SLACK_API_BASE, DEFAULT_STATS_API_BASE};
pub use pacer::Pacer;

pub const CRATE_NAME: &str = "herobot-sync";

/// Keeps calls under the stats API ceiling of 5 requests per second.
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub pacing: Duration,
    pub weekday: Weekday,
    pub store_policy: StorePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            weekday: Weekday::Mon,
            store_policy: StorePolicy::Always,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("fetching stats for {date} failed: {source}")]
    Network {
        date: NaiveDate,
        #[source]
        source: FetchError,
    },
    #[error("storing stats for {date} failed: {source}")]
    Storage {
        date: NaiveDate,
        #[source]
        source: StorageError,
    },
}

impl IngestError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Network { .. } => "network",
            Self::Storage { .. } => "storage",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    written: usize,
    skipped: usize,
}

/// Sequential fetch-then-store loop over one weekday per week.
///
/// The first failing fetch or write aborts the run; rows already written stay
/// in place and no resume point is recorded.
pub struct IngestPipeline {
    config: IngestConfig,
    source: Arc<dyn StatSource>,
    sink: Arc<dyn StatSink>,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, source: Arc<dyn StatSource>, sink: Arc<dyn StatSink>) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }

    /// Stats fetcher + Postgres sink wired from process configuration.
    pub fn from_service_config(config: &ServiceConfig, pool: PgPool) -> anyhow::Result<Self> {
        let fetcher = StatFetcher::new(
            config.stats_api_base.clone(),
            config.stats_api_key.clone(),
            HttpClientConfig {
                timeout: config.http_timeout,
                user_agent: Some(config.user_agent.clone()),
            },
        )
        .context("building stats fetcher")?;
        Ok(Self::new(
            config.ingest_config(),
            Arc::new(fetcher),
            Arc::new(PgStatSink::new(pool)),
        ))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub async fn ingest(
        &self,
        ocid: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<IngestionResult, IngestError> {
        let range = DateRange::parse(start_date, end_date)?;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest", %run_id, ocid);

        let tally = self.run(ocid, range).instrument(span).await?;
        Ok(IngestionResult {
            ocid: ocid.to_string(),
            from: start_date.to_string(),
            to: end_date.to_string(),
            mondays: tally.written,
            skipped: tally.skipped,
            status: "ok".to_string(),
        })
    }

    async fn run(&self, ocid: &str, range: DateRange) -> Result<Tally, IngestError> {
        let dates = range.weekdays(self.config.weekday);
        info!(
            planned = dates.len(),
            from = %range.start(),
            to = %range.end(),
            pacing_ms = self.config.pacing.as_millis() as u64,
            "starting paced ingestion"
        );

        let mut pacer = Pacer::new(self.config.pacing);
        let mut tally = Tally::default();

        for date in dates {
            pacer.tick().await;

            let outcome = match self.source.fetch(ocid, date).await {
                Ok(outcome) => outcome,
                Err(source) => {
                    error!(%date, written = tally.written, error = %source, "stat fetch failed; aborting run");
                    return Err(IngestError::Network { date, source });
                }
            };

            if !self.config.store_policy.admits(&outcome) {
                warn!(%date, status = outcome.status(), "skipping non-success stats response");
                tally.skipped += 1;
                continue;
            }

            let record = StatRecord::from_outcome(ocid, date, outcome);
            if let Err(source) = self.sink.write(&record).await {
                error!(%date, written = tally.written, error = %source, "stat write failed; aborting run");
                return Err(IngestError::Storage { date, source });
            }
            tally.written += 1;
            debug!(%date, status = record.upstream_status, "stored stat record");
        }

        info!(written = tally.written, skipped = tally.skipped, "ingestion complete");
        Ok(tally)
    }
}

/// One-shot ingestion for the CLI: connect, run, return the summary.
pub async fn run_ingest_once_from_env(
    ocid: &str,
    start_date: &str,
    end_date: &str,
) -> anyhow::Result<IngestionResult> {
    let config = ServiceConfig::from_env()?;
    let pool = herobot_storage::connect_pool(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")?;
    let pipeline = IngestPipeline::from_service_config(&config, pool)?;
    Ok(pipeline.ingest(ocid, start_date, end_date).await?)
}
