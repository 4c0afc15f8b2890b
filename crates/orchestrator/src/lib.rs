//! Colorspace normalization pipeline
//!
//! Takes object-created notifications and, for each record under the watched prefix,
//! converts CMYK (and other non-RGB) images to RGB in place:
//!
//! ```text
//! filter -> idempotence -> metadata -> retry budget -> fetch -> classify
//!        -> convert (bounded retries) -> upload -> conversion-time tag -> invalidate
//! ```
//!
//! Records are independent: a skip or failure never stops the rest of the batch.
//! Collaborators are injected as trait objects so the whole pipeline runs against
//! in-memory fakes in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use normalizer_orchestrator::{Collaborators, NormalizerConfig, Orchestrator};
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let config = NormalizerConfig::from_env()?;
//! let orchestrator = Orchestrator::new(config, collaborators);
//!
//! let event = serde_json::json!({"Records": []});
//! let response = orchestrator.handle_event(event).await;
//! assert_eq!(response.status_code, 200);
//! # Ok(())
//! # }
//! ```

use normalizer_storage::StorageError;
use thiserror::Error;

pub mod config;
pub mod event;
pub mod pipeline;
pub mod result;
pub mod retry;

pub use config::{ConfigError, NormalizerConfig};
pub use event::{ChangeRecord, NotificationBatch};
pub use pipeline::{Collaborators, Orchestrator};
pub use result::{
    reasons, BatchResult, BatchStatus, InvocationResponse, ProcessingResult, RecordStatus,
};
pub use retry::Backoff;

/// Failures that escape per-record handling
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid notification payload: {0}")]
    InvalidEvent(String),

    #[error("Failed to persist retry count for {key} after fetch error ({fetch_error}): {source}")]
    RetryCountNotPersisted {
        key: String,
        fetch_error: String,
        #[source]
        source: StorageError,
    },
}

/// Result type for orchestration
pub type Result<T> = std::result::Result<T, OrchestratorError>;
