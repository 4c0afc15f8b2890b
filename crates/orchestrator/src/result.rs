//! Per-record outcomes and the invocation response

use serde::{Deserialize, Serialize};

/// Skip reasons reported in [`ProcessingResult::reason`]
pub mod reasons {
    pub const NOT_WATCHED_PATH: &str = "not in watched path";
    pub const NOT_WATCHED_BUCKET: &str = "not in watched bucket";
    pub const ALREADY_PROCESSED: &str = "already processed";
    pub const MAX_RETRIES_REACHED: &str = "max retries reached";
    pub const NO_CONVERSION_NEEDED: &str = "no conversion needed";
}

/// Final state of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Converted,
    Skipped,
    Failed,
}

/// Outcome of one notification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Object key the record referred to
    pub file: String,
    pub status: RecordStatus,
    pub reason: String,
}

impl ProcessingResult {
    pub fn converted(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(file, RecordStatus::Converted, reason)
    }

    pub fn skipped(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(file, RecordStatus::Skipped, reason)
    }

    pub fn failed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(file, RecordStatus::Failed, reason)
    }

    fn new(file: impl Into<String>, status: RecordStatus, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Success,
    Error,
}

/// Outcome of a whole notification batch
///
/// `status` is `error` only when something escaped per-record handling; ordinary
/// per-record failures live in `processed_files`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub message: String,
    pub processed_files: Vec<ProcessingResult>,
}

impl BatchResult {
    pub fn push(&mut self, result: ProcessingResult) {
        self.processed_files.push(result);
    }

    /// Flag the batch as errored, keeping earlier messages
    pub fn mark_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = BatchStatus::Error;
        if self.message.is_empty() {
            self.message = message;
        } else {
            self.message = format!("{}; {message}", self.message);
        }
    }

    #[must_use]
    pub fn count(&self, status: RecordStatus) -> usize {
        self.processed_files
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    /// Outcome recorded for `file`, if any
    #[must_use]
    pub fn get(&self, file: &str) -> Option<&ProcessingResult> {
        self.processed_files.iter().find(|r| r.file == file)
    }
}

/// Response returned to the function runtime
///
/// Always status 200; the batch result travels JSON-encoded in `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl From<&BatchResult> for InvocationResponse {
    fn from(result: &BatchResult) -> Self {
        let body = serde_json::to_string(result).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "message": format!("Failed to encode batch result: {e}"),
                "processed_files": [],
            })
            .to_string()
        });
        Self {
            status_code: 200,
            body,
        }
    }
}

impl InvocationResponse {
    /// Decode the batch result carried in `body`
    pub fn batch_result(&self) -> serde_json::Result<BatchResult> {
        serde_json::from_str(&self.body)
    }
}
