use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{pdf, MentionActions, SlackError};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Bot-token Web API client.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

impl SlackClient {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building slack http client")?;
        Ok(Self {
            http,
            api_base: api_base.into(),
            bot_token,
        })
    }

    /// Fetch a private file; Slack requires the bot token on `url_private_download`.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SlackError> {
        let bytes = self
            .http
            .get(url)
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(url, bytes = bytes.len(), "downloaded slack file");
        Ok(bytes.to_vec())
    }

    pub async fn chat_post_message(&self, channel: &str, text: &str) -> Result<(), SlackError> {
        let resp: ApiResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base.trim_end_matches('/')))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.ok {
            return Err(SlackError::Api(
                resp.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MentionActions for SlackClient {
    async fn extract_pdf_text(&self, url: &str) -> Result<String, SlackError> {
        let bytes = self.download(url).await?;
        pdf::extract_pdf_text(bytes).await
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackError> {
        self.chat_post_message(channel, text).await
    }
}
