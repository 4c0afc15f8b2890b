//! Builds the production collaborators from configuration

use anyhow::{Context as _, Result};
use aws_config::BehaviorVersion;
use normalizer_alerting::{
    AlertDispatcher, LogDispatcher, SecretsManagerProvider, SlackConfig, SlackDispatcher,
};
use normalizer_cdn::CloudFrontInvalidator;
use normalizer_colorspace::StandardCodec;
use normalizer_orchestrator::{Collaborators, NormalizerConfig, Orchestrator};
use normalizer_storage::S3ObjectStorage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings from `path` when given, otherwise from the environment
pub fn load_config(path: Option<&Path>) -> Result<NormalizerConfig> {
    match path {
        Some(path) => NormalizerConfig::from_yaml(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => NormalizerConfig::from_env().context("Failed to load config from environment"),
    }
}

/// Construct an orchestrator backed by S3, CloudFront and the configured alert channel
pub async fn build_orchestrator(config: NormalizerConfig) -> Result<Orchestrator> {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let storage = S3ObjectStorage::from_sdk_config(
        &sdk_config,
        config.bucket.clone(),
        config.s3_endpoint.as_deref(),
    );

    let alerts: Arc<dyn AlertDispatcher> = match &config.alert_secret_id {
        Some(secret_id) => {
            let secrets = SecretsManagerProvider::new(aws_sdk_secretsmanager::Client::new(
                &sdk_config,
            ));
            let slack = SlackDispatcher::new(
                SlackConfig {
                    api_url: config.alert_api_url.clone(),
                    channel: config.alert_channel.clone(),
                    secret_id: secret_id.clone(),
                    secret_field: Some(config.alert_secret_field.clone()),
                    timeout: Duration::from_secs(config.alert_timeout_secs),
                },
                Arc::new(secrets),
            )
            .context("Failed to create alert dispatcher")?;
            Arc::new(slack)
        }
        None => {
            info!("No alert secret configured, alerts will only be logged");
            Arc::new(LogDispatcher)
        }
    };

    let invalidator = CloudFrontInvalidator::new(
        aws_sdk_cloudfront::Client::new(&sdk_config),
        config.cdn_distribution_id.clone(),
    );

    info!(
        bucket = %config.bucket,
        watched_prefix = %config.watched_prefix,
        max_retries = config.max_retries,
        max_conversion_attempts = config.max_conversion_attempts,
        "Normalizer configured"
    );

    let codec = StandardCodec::new(config.jpeg_quality);
    Ok(Orchestrator::new(
        config,
        Collaborators {
            storage: Arc::new(storage),
            codec: Arc::new(codec),
            alerts,
            invalidator: Arc::new(invalidator),
        },
    ))
}
