//! Secret lookup for alert credentials

use crate::{AlertError, AlertResult};
use aws_sdk_secretsmanager::{error::DisplayErrorContext, Client};
use tracing::debug;

/// Source of secret strings
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, secret_id: &str) -> AlertResult<String>;
}

/// AWS Secrets Manager backed provider
pub struct SecretsManagerProvider {
    client: Client,
}

impl SecretsManagerProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SecretProvider for SecretsManagerProvider {
    async fn get_secret(&self, secret_id: &str) -> AlertResult<String> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| AlertError::SecretError(DisplayErrorContext(e).to_string()))?;

        debug!(secret_id, "Fetched secret");

        response
            .secret_string()
            .map(ToString::to_string)
            .ok_or_else(|| AlertError::SecretError(format!("secret {secret_id} has no string value")))
    }
}

/// Pull the token out of a secret value
///
/// JSON object secrets must hold the token under `field`; anything else is the token itself.
pub fn extract_token(secret: &str, field: Option<&str>) -> AlertResult<String> {
    let secret = secret.trim();

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(secret) {
        let field = field.ok_or_else(|| {
            AlertError::SecretError("secret is a JSON object but no token field is configured".to_string())
        })?;
        return map
            .get(field)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| AlertError::SecretError(format!("secret has no string field {field}")));
    }

    if secret.is_empty() {
        return Err(AlertError::SecretError("secret is empty".to_string()));
    }
    Ok(secret.to_string())
}
