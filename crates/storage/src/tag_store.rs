//! Per-object tag adapter
//!
//! All tag writes go through [`TagStore::update`], which reads the current set,
//! applies one change and writes the whole set back. S3 has no partial tag update.

use crate::{ObjectStorage, StorageResult};
use normalizer_common::{TagSet, RETRY_COUNT_TAG};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads and writes the tags that drive idempotence and retry bookkeeping
#[derive(Clone)]
pub struct TagStore {
    storage: Arc<dyn ObjectStorage>,
    processed_markers: Vec<String>,
}

impl TagStore {
    /// `processed_markers` are the tag names whose presence means "already converted"
    pub fn new(storage: Arc<dyn ObjectStorage>, processed_markers: Vec<String>) -> Self {
        Self {
            storage,
            processed_markers,
        }
    }

    /// Current tags, or an empty set if they cannot be read
    pub async fn get_tags(&self, key: &str) -> TagSet {
        match self.storage.get_tags(key).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(key, error = %e, "Failed to read object tags, treating as untagged");
                TagSet::new()
            }
        }
    }

    /// Set one tag, keeping every other tag on the object
    pub async fn set_tag(&self, key: &str, name: &str, value: &str) -> StorageResult<TagSet> {
        self.update(key, |tags| {
            tags.upsert(name, value);
            tags.clone()
        })
        .await
    }

    /// Retry count currently persisted on the object
    pub async fn get_retry_count(&self, key: &str) -> u32 {
        retry_count(&self.get_tags(key).await)
    }

    /// Persist `retryCount + 1` and return the new value
    pub async fn increment_retry_count(&self, key: &str) -> StorageResult<u32> {
        let count = self
            .update(key, |tags| {
                let next = retry_count(tags).saturating_add(1);
                tags.upsert(RETRY_COUNT_TAG, next.to_string());
                next
            })
            .await?;

        debug!(key, retry_count = count, "Persisted retry count");
        Ok(count)
    }

    /// Whether any terminal marker is present
    #[must_use]
    pub fn is_processed(&self, tags: &TagSet) -> bool {
        self.processed_markers.iter().any(|m| tags.contains(m))
    }

    /// Read-modify-write of the full tag set
    ///
    /// A failed read aborts the update so existing tags are never overwritten blind.
    async fn update<T>(&self, key: &str, change: impl FnOnce(&mut TagSet) -> T) -> StorageResult<T> {
        let mut tags = self.storage.get_tags(key).await?;
        let out = change(&mut tags);
        self.storage.put_tags(key, &tags).await?;
        Ok(out)
    }
}

/// Retry count in `tags`; missing or malformed values count as zero
#[must_use]
pub fn retry_count(tags: &TagSet) -> u32 {
    match tags.get(RETRY_COUNT_TAG) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(value = raw, "Ignoring malformed retry count tag");
            0
        }),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryObject, MemoryObjectStorage, OperationKind};
    use normalizer_common::{CONVERSION_TIME_TAG, LEGACY_PROCESSED_TAG, PROCESSED_TAG};

    fn store_with(tags: TagSet) -> (Arc<MemoryObjectStorage>, TagStore) {
        let storage = Arc::new(MemoryObjectStorage::new("bucket"));
        storage.insert(
            "ns/a.jpg",
            MemoryObject::new(b"img".to_vec(), Some("image/jpeg")).with_tags(tags),
        );
        let store = TagStore::new(
            storage.clone(),
            vec![PROCESSED_TAG.to_string(), LEGACY_PROCESSED_TAG.to_string()],
        );
        (storage, store)
    }

    #[tokio::test]
    async fn test_set_tag_keeps_other_tags() {
        let (storage, store) = store_with(TagSet::new().with(PROCESSED_TAG, "true"));

        store.set_tag("ns/a.jpg", CONVERSION_TIME_TAG, "3").await.unwrap();
        store.set_tag("ns/a.jpg", CONVERSION_TIME_TAG, "5").await.unwrap();

        let tags = storage.object("ns/a.jpg").unwrap().tags;
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get(PROCESSED_TAG), Some("true"));
        assert_eq!(tags.get(CONVERSION_TIME_TAG), Some("5"));
    }

    #[tokio::test]
    async fn test_increment_retry_count() {
        let (storage, store) = store_with(TagSet::new().with(RETRY_COUNT_TAG, "1"));

        assert_eq!(store.increment_retry_count("ns/a.jpg").await.unwrap(), 2);
        assert_eq!(store.get_retry_count("ns/a.jpg").await, 2);
        assert_eq!(
            storage.object("ns/a.jpg").unwrap().tags.get(RETRY_COUNT_TAG),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_get_tags_failure_is_empty() {
        let (storage, store) = store_with(TagSet::new().with(RETRY_COUNT_TAG, "2"));
        storage.fail(OperationKind::GetTags, "access denied");

        assert!(store.get_tags("ns/a.jpg").await.is_empty());
        assert_eq!(store.get_retry_count("ns/a.jpg").await, 0);
    }

    #[tokio::test]
    async fn test_update_does_not_write_after_failed_read() {
        let (storage, store) = store_with(TagSet::new().with(PROCESSED_TAG, "true"));
        storage.fail(OperationKind::GetTags, "throttled");

        assert!(store.increment_retry_count("ns/a.jpg").await.is_err());
        assert_eq!(storage.count(OperationKind::PutTags), 0);
    }

    #[test]
    fn test_malformed_retry_count_is_zero() {
        assert_eq!(retry_count(&TagSet::new().with(RETRY_COUNT_TAG, "three")), 0);
        assert_eq!(retry_count(&TagSet::new().with(RETRY_COUNT_TAG, " 4 ")), 4);
        assert_eq!(retry_count(&TagSet::new()), 0);
    }

    #[test]
    fn test_legacy_marker_counts_as_processed() {
        let (_, store) = store_with(TagSet::new());
        assert!(store.is_processed(&TagSet::new().with(LEGACY_PROCESSED_TAG, "true")));
        assert!(store.is_processed(&TagSet::new().with(PROCESSED_TAG, "true")));
        assert!(!store.is_processed(&TagSet::new().with(RETRY_COUNT_TAG, "1")));
    }
}
