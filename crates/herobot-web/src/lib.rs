//! Axum front door: Slack event webhook + weekly hero stat ingestion endpoint.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use herobot_slack::{dispatch, verify_signature, EventEnvelope, MentionActions, SignatureError, SlackClient};
use herobot_storage::PgPool;
use herobot_sync::{IngestError, IngestPipeline, ServiceConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "herobot-web";

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub slack: Arc<dyn MentionActions>,
    pub signing_secret: Option<SecretString>,
    pub pool: Option<PgPool>,
}

#[derive(Debug, Deserialize)]
struct MondaysQuery {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: String,
    checked_at: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", post(index_handler))
        .route("/slack/events", post(slack_events_handler))
        .route("/heroes/{ocid}/mondays", get(hero_mondays_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Connect, migrate, and serve until ctrl-c.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let pool = herobot_storage::connect_pool(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")?;
    herobot_storage::run_migrations(&pool)
        .await
        .context("applying migrations")?;

    let pipeline = IngestPipeline::from_service_config(&config, pool.clone())?;
    let slack = SlackClient::new(
        config.slack_api_base.clone(),
        config.slack_bot_token.clone(),
        config.http_timeout,
    )?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        slack: Arc::new(slack),
        signing_secret: config.slack_signing_secret.clone(),
        pool: Some(pool),
    };

    let listener = TcpListener::bind((config.bind_addr.as_str(), config.web_port))
        .await
        .with_context(|| format!("binding {}:{}", config.bind_addr, config.web_port))?;
    info!(
        addr = %listener.local_addr()?,
        signature_checks = state.signing_secret.is_some(),
        "herobot listening"
    );
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("herobot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
}

async fn index_handler() -> &'static str {
    ""
}

async fn slack_events_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.signing_secret {
        if let Err(err) = verify_request(secret, &headers, &body) {
            warn!(error = %err, "rejected slack request");
            return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
        }
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "malformed slack event payload");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("invalid event payload: {err}"),
            )
                .into_response();
        }
    };

    info!(envelope_type = %envelope.kind, "slack event received");
    let (reply, _followup) = dispatch(envelope, state.slack.clone());
    reply.body().to_string().into_response()
}

fn verify_request(
    secret: &SecretString,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    verify_signature(
        secret.expose_secret(),
        header(TIMESTAMP_HEADER),
        body,
        header(SIGNATURE_HEADER),
        Utc::now().timestamp(),
    )
}

async fn hero_mondays_handler(
    State(state): State<Arc<AppState>>,
    Path(ocid): Path<String>,
    Query(query): Query<MondaysQuery>,
) -> Response {
    match state
        .pipeline
        .ingest(&ocid, &query.start_date, &query.end_date)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(err) => ingest_error_response(err),
    }
}

fn ingest_error_response(err: IngestError) -> Response {
    let status = match &err {
        IngestError::Validation(_) => StatusCode::BAD_REQUEST,
        IngestError::Network { .. } => StatusCode::BAD_GATEWAY,
        IngestError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": err.kind(), "detail": err.to_string() })),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let (status, database) = match &state.pool {
        Some(pool) => match herobot_storage::ping(pool).await {
            Ok(()) => ("ready", "database query succeeded".to_string()),
            Err(err) => ("degraded", format!("database query failed: {err}")),
        },
        None => ("degraded", "database not configured".to_string()),
    };
    let code = if status == "ready" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status,
            database,
            checked_at: Utc::now().to_rfc3339(),
        }),
    )
        .into_response()
}
