//! Slack Events API contracts + app-mention dispatch.

mod client;
mod pdf;
mod signature;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

pub use client::SlackClient;
pub use pdf::{extract_pdf_text, preview};
pub use signature::{sign, verify_signature, SignatureError, SIGNATURE_MAX_AGE_SECS};

pub const CRATE_NAME: &str = "herobot-slack";

pub const PDF_MIMETYPE: &str = "application/pdf";

const PREVIEW_CHARS: usize = 100;

/// Outer JSON body Slack posts to the events endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<CallbackEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<SlackFile>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private_download: Option<String>,
}

impl SlackFile {
    /// Download URL, only for PDFs that carry one.
    pub fn pdf_download_url(&self) -> Option<&str> {
        if self.mimetype.as_deref() != Some(PDF_MIMETYPE) {
            return None;
        }
        self.url_private_download.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("slack request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
}

/// Side effects an app mention can trigger.
#[async_trait]
pub trait MentionActions: Send + Sync {
    async fn extract_pdf_text(&self, url: &str) -> Result<String, SlackError>;
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventReply {
    Challenge(String),
    Ack,
    Ignored,
}

impl EventReply {
    pub fn body(&self) -> &str {
        match self {
            Self::Challenge(challenge) => challenge,
            Self::Ack => "",
            Self::Ignored => "Ignored",
        }
    }
}

/// Route one envelope and return the reply right away.
///
/// App mention side effects (PDF extraction, channel echo) run on a spawned
/// task whose handle is returned; Slack redelivers events it does not see
/// acknowledged within three seconds. Their failures are only logged.
pub fn dispatch(
    envelope: EventEnvelope,
    actions: Arc<dyn MentionActions>,
) -> (EventReply, Option<JoinHandle<()>>) {
    match envelope.kind.as_str() {
        "url_verification" => (EventReply::Challenge(envelope.challenge.unwrap_or_default()), None),
        "event_callback" => {
            let Some(event) = envelope.event else {
                return (EventReply::Ignored, None);
            };
            debug!(event_type = %event.kind, "received slack callback event");
            let followup = (event.kind == "app_mention").then(|| {
                tokio::spawn(
                    async move { handle_mention(event, actions.as_ref()).await }.in_current_span(),
                )
            });
            (EventReply::Ack, followup)
        }
        other => {
            debug!(envelope_type = other, "ignoring slack envelope");
            (EventReply::Ignored, None)
        }
    }
}

async fn handle_mention(event: CallbackEvent, actions: &dyn MentionActions) {
    for file in event.files.iter().flatten() {
        let Some(url) = file.pdf_download_url() else {
            continue;
        };
        let name = file.name.as_deref().unwrap_or("unnamed");
        match actions.extract_pdf_text(url).await {
            Ok(text) => info!(
                file = name,
                chars = text.chars().count(),
                preview = %preview(&text, PREVIEW_CHARS),
                "extracted pdf text"
            ),
            Err(err) => warn!(file = name, error = %err, "pdf extraction failed"),
        }
    }

    let channel = event.channel.as_deref().filter(|c| !c.is_empty());
    let text = event.text.as_deref().filter(|t| !t.is_empty());
    if let (Some(channel), Some(text)) = (channel, text) {
        if let Err(err) = actions.post_message(channel, text).await {
            warn!(channel, error = %err, "echo to channel failed");
        }
    }
}
