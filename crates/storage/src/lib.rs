//! Storage layer for the colorspace normalizer
//!
//! This crate provides the object storage interface the conversion pipeline runs against:
//! - **Object Storage (S3/MinIO)**: image bytes, content type, user metadata, object tags
//! - **In-memory storage**: the same interface over a `HashMap`, for tests and dry runs
//! - **Tag Store**: the single read-modify-write path for per-object tags
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use normalizer_storage::{ObjectStorage, S3ObjectStorage, TagStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//!     let storage = Arc::new(S3ObjectStorage::from_sdk_config(&sdk_config, "media-bucket", None));
//!
//!     let object = storage.get_object("ns/pages_1/a.jpg").await?;
//!     println!("{} bytes", object.body.len());
//!
//!     let tags = TagStore::new(storage, vec!["isRgbProcessed".to_string()]);
//!     let retries = tags.get_retry_count("ns/pages_1/a.jpg").await;
//!     println!("retries so far: {retries}");
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub mod memory;
pub mod object_storage;
pub mod tag_store;

pub use memory::{MemoryObject, MemoryObjectStorage, OperationKind, StorageOperation};
pub use object_storage::{ObjectStorage, S3ObjectStorage};
pub use tag_store::{retry_count, TagStore};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object content as downloaded
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,

    /// User metadata (`x-amz-meta-*`), keys without the prefix
    pub user_metadata: HashMap<String, String>,
}

/// Object metadata as returned by a HEAD request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: Option<String>,

    /// User metadata (`x-amz-meta-*`), keys without the prefix
    pub user_metadata: HashMap<String, String>,
}
