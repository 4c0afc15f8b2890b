//! CDN cache invalidation
//!
//! One request per converted object, covering exactly the object's own path.

use aws_sdk_cloudfront::{
    error::DisplayErrorContext,
    types::{InvalidationBatch, Paths},
    Client,
};
use normalizer_common::encode_key_path;
use thiserror::Error;
use tracing::info;

/// Cache invalidation errors
#[derive(Error, Debug)]
pub enum CdnError {
    #[error("CloudFront error: {0}")]
    CloudFrontError(String),

    #[error("Invalid invalidation request: {0}")]
    InvalidRequest(String),
}

/// Result type for cache invalidation
pub type CdnResult<T> = Result<T, CdnError>;

/// Requests removal of a cached object
#[async_trait::async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate the cached copy of `object_key`, returning the request id
    async fn invalidate(&self, object_key: &str) -> CdnResult<String>;
}

/// CDN path for an object key, percent-encoded the way viewers request it
#[must_use]
pub fn invalidation_path(object_key: &str) -> String {
    encode_key_path(object_key)
}

/// CloudFront distribution invalidator
pub struct CloudFrontInvalidator {
    client: Client,
    distribution_id: String,
}

impl CloudFrontInvalidator {
    pub fn new(client: Client, distribution_id: impl Into<String>) -> Self {
        Self {
            client,
            distribution_id: distribution_id.into(),
        }
    }

    fn batch(object_key: &str) -> CdnResult<InvalidationBatch> {
        let paths = Paths::builder()
            .quantity(1)
            .items(invalidation_path(object_key))
            .build()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))?;

        InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(uuid::Uuid::new_v4().to_string())
            .build()
            .map_err(|e| CdnError::InvalidRequest(e.to_string()))
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for CloudFrontInvalidator {
    async fn invalidate(&self, object_key: &str) -> CdnResult<String> {
        let response = self
            .client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(Self::batch(object_key)?)
            .send()
            .await
            .map_err(|e| CdnError::CloudFrontError(DisplayErrorContext(e).to_string()))?;

        let id = response
            .invalidation()
            .map(|i| i.id().to_string())
            .unwrap_or_default();

        info!(
            distribution_id = %self.distribution_id,
            path = %invalidation_path(object_key),
            invalidation_id = %id,
            "Requested cache invalidation"
        );

        Ok(id)
    }
}
