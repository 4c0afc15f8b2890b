//! Object storage implementation using S3/MinIO
//!
//! Every call is scoped to the bucket the storage was built for; keys are passed through as-is.

use crate::{ObjectMetadata, StorageError, StorageResult, StoredObject};
use aws_sdk_s3::{
    error::DisplayErrorContext,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    primitives::ByteStream,
    types::{Tag as S3Tag, Tagging},
    Client,
};
use normalizer_common::{Tag, TagSet};
use std::collections::HashMap;
use tracing::debug;

/// Object storage trait
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket this storage reads and writes
    fn bucket(&self) -> &str;

    /// Download an object's content
    async fn get_object(&self, key: &str) -> StorageResult<StoredObject>;

    /// Fetch an object's metadata without its content
    async fn head_object(&self, key: &str) -> StorageResult<ObjectMetadata>;

    /// Write an object, replacing its content, user metadata and whole tag set
    ///
    /// Metadata not passed in `metadata` is gone afterwards.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
        tags: &TagSet,
    ) -> StorageResult<()>;

    /// Read the full tag set of an object
    async fn get_tags(&self, key: &str) -> StorageResult<TagSet>;

    /// Replace the full tag set of an object
    async fn put_tags(&self, key: &str, tags: &TagSet) -> StorageResult<()>;
}

/// S3/MinIO object storage implementation
pub struct S3ObjectStorage {
    client: Client,
    bucket: String,
}

impl S3ObjectStorage {
    /// Wrap an existing S3 client
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from shared AWS configuration
    ///
    /// `endpoint` points the client at a custom endpoint such as `MinIO`.
    pub fn from_sdk_config(
        sdk_config: &aws_config::SdkConfig,
        bucket: impl Into<String>,
        endpoint: Option<&str>,
    ) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true); // Required for MinIO
        }

        Self::new(Client::from_conf(builder.build()), bucket)
    }
}

fn s3_error(err: impl std::error::Error) -> StorageError {
    StorageError::S3Error(DisplayErrorContext(err).to_string())
}

#[async_trait::async_trait]
impl ObjectStorage for S3ObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetObjectError::NoSuchKey(_) => StorageError::NotFound(key.to_string()),
                other => s3_error(other),
            })?;

        let content_type = response.content_type().map(ToString::to_string);
        let user_metadata = response.metadata().cloned().unwrap_or_default();

        let body = response.body.collect().await.map_err(s3_error)?;
        let body = body.into_bytes().to_vec();

        debug!(bucket = %self.bucket, key, size = body.len(), "Downloaded object");

        Ok(StoredObject {
            body,
            content_type,
            user_metadata,
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                HeadObjectError::NotFound(_) => StorageError::NotFound(key.to_string()),
                other => s3_error(other),
            })?;

        Ok(ObjectMetadata {
            content_type: response.content_type().map(ToString::to_string),
            user_metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
        metadata: &HashMap<String, String>,
        tags: &TagSet,
    ) -> StorageResult<()> {
        let size = body.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(ToString::to_string))
            .set_metadata((!metadata.is_empty()).then(|| metadata.clone()));

        if !tags.is_empty() {
            request = request.tagging(tags.to_query_string());
        }

        request.send().await.map_err(s3_error)?;

        debug!(bucket = %self.bucket, key, size, "Uploaded object");
        Ok(())
    }

    async fn get_tags(&self, key: &str) -> StorageResult<TagSet> {
        let response = self
            .client
            .get_object_tagging()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_error)?;

        Ok(response
            .tag_set()
            .iter()
            .map(|t| Tag::new(t.key(), t.value()))
            .collect())
    }

    async fn put_tags(&self, key: &str, tags: &TagSet) -> StorageResult<()> {
        let tag_set = tags
            .iter()
            .map(|t| S3Tag::builder().key(&t.key).value(&t.value).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::InvalidTag(e.to_string()))?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| StorageError::InvalidTag(e.to_string()))?;

        self.client
            .put_object_tagging()
            .bucket(&self.bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(s3_error)?;

        Ok(())
    }
}
