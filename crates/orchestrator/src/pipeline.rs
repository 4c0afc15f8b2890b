//! Per-record conversion pipeline

use crate::config::NormalizerConfig;
use crate::event::{ChangeRecord, NotificationBatch};
use crate::result::{reasons, BatchResult, InvocationResponse, ProcessingResult, RecordStatus};
use crate::OrchestratorError;
use normalizer_alerting::{Alert, AlertDispatcher};
use normalizer_cdn::CacheInvalidator;
use normalizer_colorspace::{classify, convert_to_target, ColorspaceError, ImageCodec};
use normalizer_common::{file_name_from_key, TagSet, CONVERSION_TIME_TAG, FLAG_VALUE};
use normalizer_storage::{retry_count, ObjectStorage, TagStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Original file name reported when a payload names no object
const UNKNOWN_FILE: &str = "unknown";

/// External capabilities the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub codec: Arc<dyn ImageCodec>,
    pub alerts: Arc<dyn AlertDispatcher>,
    pub invalidator: Arc<dyn CacheInvalidator>,
}

/// What an alert about the current record says
#[derive(Debug, Clone)]
struct RecordContext {
    original_file: String,
    cdn_url: String,
    retries: u32,
}

/// A failure that escaped per-record handling
struct Escalation {
    context: RecordContext,
    error: OrchestratorError,
}

/// Drives each notification record through filter, conversion and publication
pub struct Orchestrator {
    config: NormalizerConfig,
    storage: Arc<dyn ObjectStorage>,
    tags: TagStore,
    codec: Arc<dyn ImageCodec>,
    alerts: Arc<dyn AlertDispatcher>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl Orchestrator {
    pub fn new(config: NormalizerConfig, collaborators: Collaborators) -> Self {
        let tags = TagStore::new(collaborators.storage.clone(), config.processed_markers());
        Self {
            config,
            storage: collaborators.storage,
            tags,
            codec: collaborators.codec,
            alerts: collaborators.alerts,
            invalidator: collaborators.invalidator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Handle a raw invocation payload
    ///
    /// Always answers; a payload that is not a notification batch produces an
    /// `error` batch with no records and one alert.
    pub async fn handle_event(&self, event: serde_json::Value) -> InvocationResponse {
        let result = match NotificationBatch::from_value(event) {
            Ok(batch) => self.process_batch(&batch).await,
            Err(e) => {
                error!(error = %e, "Rejected invocation payload");
                let mut result = BatchResult::default();
                result.mark_error(e.to_string());
                let context = RecordContext {
                    original_file: UNKNOWN_FILE.to_string(),
                    cdn_url: self.config.cdn_base_url.clone(),
                    retries: 0,
                };
                self.alert(&context, e.to_string()).await;
                result
            }
        };
        InvocationResponse::from(&result)
    }

    /// Process every record of a batch, in order
    pub async fn process_batch(&self, batch: &NotificationBatch) -> BatchResult {
        let span = info_span!("process_batch", records = batch.len());
        async move {
            let started = Instant::now();
            let mut result = BatchResult::default();

            for record in &batch.records {
                let key = record.key();
                match self.process_record(record, &key, started).await {
                    Ok(outcome) => {
                        info!(
                            key = %key,
                            status = ?outcome.status,
                            reason = %outcome.reason,
                            "Record processed"
                        );
                        result.push(outcome);
                    }
                    Err(Escalation { context, error }) => {
                        error!(key = %key, error = %error, "Record processing aborted");
                        result.mark_error(format!("{key}: {error}"));
                        result.push(ProcessingResult::failed(&key, error.to_string()));
                        self.alert(&context, error.to_string()).await;
                    }
                }
            }

            info!(
                converted = result.count(RecordStatus::Converted),
                skipped = result.count(RecordStatus::Skipped),
                failed = result.count(RecordStatus::Failed),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch complete"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn process_record(
        &self,
        record: &ChangeRecord,
        key: &str,
        started: Instant,
    ) -> Result<ProcessingResult, Escalation> {
        if !self.config.is_watched(key) {
            return Ok(ProcessingResult::skipped(key, reasons::NOT_WATCHED_PATH));
        }
        if let Some(bucket) = record.bucket() {
            if bucket != self.storage.bucket() {
                debug!(key, bucket, "Record names another bucket");
                return Ok(ProcessingResult::skipped(key, reasons::NOT_WATCHED_BUCKET));
            }
        }

        let tags = self.tags.get_tags(key).await;
        if self.tags.is_processed(&tags) {
            return Ok(ProcessingResult::skipped(key, reasons::ALREADY_PROCESSED));
        }

        let mut context = RecordContext {
            original_file: self.original_file_name(key).await,
            cdn_url: self.config.cdn_url(key),
            retries: retry_count(&tags),
        };

        if context.retries >= self.config.max_retries {
            warn!(key, retries = context.retries, "Retry budget exhausted");
            self.alert(&context, reasons::MAX_RETRIES_REACHED).await;
            return Ok(ProcessingResult::skipped(key, reasons::MAX_RETRIES_REACHED));
        }

        let object = match self.storage.get_object(key).await {
            Ok(object) => object,
            Err(fetch_error) => {
                let fetch_error = fetch_error.to_string();
                context.retries = match self.tags.increment_retry_count(key).await {
                    Ok(retries) => retries,
                    Err(source) => {
                        return Err(Escalation {
                            context,
                            error: OrchestratorError::RetryCountNotPersisted {
                                key: key.to_string(),
                                fetch_error,
                                source,
                            },
                        })
                    }
                };
                warn!(key, retries = context.retries, error = %fetch_error, "Fetch failed");
                self.alert(&context, fetch_error.clone()).await;
                return Ok(ProcessingResult::failed(key, fetch_error));
            }
        };

        let image = match self.codec.decode(&object.body) {
            Ok(image) => image,
            Err(e) => {
                let reason = format!("decode failed: {e}");
                self.alert(&context, reason.clone()).await;
                return Ok(ProcessingResult::failed(key, reason));
            }
        };

        let colorspace = classify(&image);
        if colorspace.is_target() {
            debug!(key, colorspace = %colorspace, "Already in target colorspace");
            return Ok(ProcessingResult::skipped(key, reasons::NO_CONVERSION_NEEDED));
        }
        let content_type = object
            .content_type
            .clone()
            .unwrap_or_else(|| image.format().to_mime_type().to_string());
        drop(image);

        let converted = match self.convert_with_retry(key, &object.body).await {
            Ok(buffer) => buffer,
            Err(e) => {
                let reason = format!(
                    "conversion failed after {} attempts: {e}",
                    self.config.max_conversion_attempts
                );
                self.alert(&context, reason.clone()).await;
                return Ok(ProcessingResult::failed(key, reason));
            }
        };

        let upload_tags = TagSet::new().with(&self.config.processed_tag, FLAG_VALUE);
        if let Err(e) = self
            .storage
            .put_object(
                key,
                converted,
                Some(&content_type),
                &object.user_metadata,
                &upload_tags,
            )
            .await
        {
            let reason = format!("upload failed: {e}");
            self.alert(&context, reason.clone()).await;
            return Ok(ProcessingResult::failed(key, reason));
        }
        info!(key, colorspace = %colorspace, "Uploaded converted image");

        let elapsed = started.elapsed().as_secs();
        if let Err(e) = self
            .tags
            .set_tag(key, CONVERSION_TIME_TAG, &elapsed.to_string())
            .await
        {
            self.alert(&context, format!("failed to record conversion time: {e}"))
                .await;
        }

        if let Err(e) = self.invalidator.invalidate(key).await {
            self.alert(&context, format!("cache invalidation failed: {e}"))
                .await;
        }

        Ok(ProcessingResult::converted(
            key,
            format!("converted {colorspace} to RGB"),
        ))
    }

    /// File name as uploaded, or the last key segment
    async fn original_file_name(&self, key: &str) -> String {
        let fallback = || file_name_from_key(key).to_string();
        match self.storage.head_object(key).await {
            Ok(metadata) => metadata
                .user_metadata
                .get(&self.config.original_name_metadata_key)
                .filter(|name| !name.trim().is_empty())
                .cloned()
                .unwrap_or_else(fallback),
            Err(e) => {
                debug!(key, error = %e, "No object metadata, using key for file name");
                fallback()
            }
        }
    }

    /// Decode, convert and re-encode, retrying up to the attempt budget
    async fn convert_with_retry(&self, key: &str, body: &[u8]) -> Result<Vec<u8>, ColorspaceError> {
        let attempts = self.config.max_conversion_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.convert_once(body) {
                Ok(buffer) => {
                    debug!(key, attempt, bytes = buffer.len(), "Conversion succeeded");
                    return Ok(buffer);
                }
                Err(e) if attempt + 1 < attempts => {
                    warn!(key, attempt, error = %e, "Conversion attempt failed");
                    self.config.conversion_backoff.wait(attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(key, attempt, error = %e, "Conversion failed");
                    return Err(e);
                }
            }
        }
    }

    fn convert_once(&self, body: &[u8]) -> Result<Vec<u8>, ColorspaceError> {
        let image = self.codec.decode(body)?;
        let converted = convert_to_target(image)?;
        self.codec.encode(&converted)
    }

    async fn alert(&self, context: &RecordContext, error: impl Into<String>) {
        self.alerts
            .alert(&Alert {
                original_file: context.original_file.clone(),
                cdn_url: context.cdn_url.clone(),
                error: error.into(),
                retries: context.retries,
            })
            .await;
    }
}
