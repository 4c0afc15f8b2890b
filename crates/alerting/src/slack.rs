//! Chat alert delivery
//!
//! The bot token is fetched from the secrets store on the first alert and cached for
//! the rest of the process. A failed fetch is not cached, so the next alert retries it.

use crate::secrets::extract_token;
use crate::{Alert, AlertDispatcher, AlertError, AlertResult, SecretProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Chat API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// `chat.postMessage` endpoint
    pub api_url: String,

    pub channel: String,

    /// Secrets store id of the bot token
    pub secret_id: String,

    /// Field holding the token when the secret is a JSON object
    pub secret_field: Option<String>,

    pub timeout: Duration,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Posts alerts to a chat channel
pub struct SlackDispatcher {
    http: reqwest::Client,
    config: SlackConfig,
    secrets: Arc<dyn SecretProvider>,
    token: OnceCell<String>,
}

impl SlackDispatcher {
    pub fn new(config: SlackConfig, secrets: Arc<dyn SecretProvider>) -> AlertResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlertError::HttpError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            secrets,
            token: OnceCell::new(),
        })
    }

    async fn token(&self) -> AlertResult<&str> {
        self.token
            .get_or_try_init(|| async {
                let secret = self.secrets.get_secret(&self.config.secret_id).await?;
                extract_token(&secret, self.config.secret_field.as_deref())
            })
            .await
            .map(String::as_str)
    }

    /// Deliver one alert, reporting any failure
    pub async fn send(&self, alert: &Alert) -> AlertResult<()> {
        let token = self.token().await?;

        let message = PostMessage {
            channel: &self.config.channel,
            text: alert.to_text(),
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(token)
            .json(&message)
            .send()
            .await
            .map_err(|e| AlertError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::HttpError(format!(
                "chat API returned status {status}"
            )));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| AlertError::HttpError(format!("Invalid chat API response: {e}")))?;

        if !body.ok {
            return Err(AlertError::Rejected(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for SlackDispatcher {
    async fn alert(&self, alert: &Alert) {
        match self.send(alert).await {
            Ok(()) => info!(
                channel = %self.config.channel,
                original_file = %alert.original_file,
                "Alert delivered"
            ),
            Err(e) => error!(
                channel = %self.config.channel,
                original_file = %alert.original_file,
                alert_error = %alert.error,
                error = %e,
                "Failed to deliver alert"
            ),
        }
    }
}
