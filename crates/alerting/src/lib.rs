//! Failure alerts for the colorspace normalizer
//!
//! Alerts are fire-and-forget: [`AlertDispatcher::alert`] never returns an error, a
//! failed delivery is logged and dropped.
//! - [`SlackDispatcher`]: posts to the chat API with a token from the secrets store
//! - [`LogDispatcher`]: only logs, for deployments without an alert channel

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub mod secrets;
pub mod slack;

pub use secrets::{SecretProvider, SecretsManagerProvider};
pub use slack::{SlackConfig, SlackDispatcher};

/// Errors raised while delivering an alert
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Secret error: {0}")]
    SecretError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Chat API rejected the message: {0}")]
    Rejected(String),
}

/// Result type for alert delivery
pub type AlertResult<T> = Result<T, AlertError>;

/// A conversion failure worth a human's attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// File name as uploaded, falling back to the last key segment
    pub original_file: String,
    pub cdn_url: String,
    pub error: String,
    pub retries: u32,
}

impl Alert {
    /// Message body shown in the channel
    #[must_use]
    pub fn to_text(&self) -> String {
        format!(
            ":rotating_light: *Image colorspace conversion failed*\n\
             *Original File:* {}\n\
             *CDN URL:* {}\n\
             *Retries:* {}\n\
             *Error:* {}",
            self.original_file, self.cdn_url, self.retries, self.error
        )
    }
}

/// Sends alerts somewhere a human will see them
#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Deliver an alert; delivery failures are logged, never returned
    async fn alert(&self, alert: &Alert);
}

/// Dispatcher that only writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait::async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn alert(&self, alert: &Alert) {
        warn!(
            original_file = %alert.original_file,
            cdn_url = %alert.cdn_url,
            retries = alert.retries,
            error = %alert.error,
            "Conversion alert (no alert channel configured)"
        );
    }
}
