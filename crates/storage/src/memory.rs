//! In-memory object storage
//!
//! Implements [`ObjectStorage`] over a `HashMap` and records every call, so the
//! pipeline can be exercised without a live bucket. Failures can be injected per
//! operation kind.

use crate::{ObjectMetadata, ObjectStorage, StorageError, StorageResult, StoredObject};
use normalizer_common::TagSet;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kind of storage call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Get,
    Head,
    Put,
    GetTags,
    PutTags,
}

/// A recorded storage call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOperation {
    pub kind: OperationKind,
    pub key: String,
}

/// A stored object with everything the backend keeps about it
#[derive(Debug, Clone, Default)]
pub struct MemoryObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub user_metadata: HashMap<String, String>,
    pub tags: TagSet,
}

impl MemoryObject {
    pub fn new(body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.map(ToString::to_string),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Default)]
struct State {
    objects: HashMap<String, MemoryObject>,
    failures: HashMap<OperationKind, String>,
    operations: Vec<StorageOperation>,
}

/// `HashMap`-backed object storage
pub struct MemoryObjectStorage {
    bucket: String,
    state: Mutex<State>,
}

impl MemoryObjectStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object directly, bypassing the operation log
    pub fn insert(&self, key: impl Into<String>, object: MemoryObject) {
        self.state().objects.insert(key.into(), object);
    }

    /// Current state of an object
    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.state().objects.get(key).cloned()
    }

    /// Make every subsequent call of `kind` fail with `message`
    pub fn fail(&self, kind: OperationKind, message: impl Into<String>) {
        self.state().failures.insert(kind, message.into());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// All calls made so far, in order
    pub fn operations(&self) -> Vec<StorageOperation> {
        self.state().operations.clone()
    }

    /// Number of calls of `kind` made so far
    pub fn count(&self, kind: OperationKind) -> usize {
        self.state()
            .operations
            .iter()
            .filter(|op| op.kind == kind)
            .count()
    }

    /// Log the call, then fail it if a failure is armed for its kind
    fn record(&self, kind: OperationKind, key: &str) -> StorageResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.operations.push(StorageOperation {
            kind,
            key: key.to_string(),
        });
        if let Some(message) = state.failures.get(&kind) {
            return Err(StorageError::S3Error(message.clone()));
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_object(&self, key: &str) -> StorageResult<StoredObject> {
        let state = self.record(OperationKind::Get, key)?;
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        Ok(StoredObject {
            body: object.body.clone(),
            content_type: object.content_type.clone(),
            user_metadata: object.user_metadata.clone(),
        })
    }

    async fn head_object(&self, key: &str) -> StorageResult<ObjectMetadata> {
        let state = self.record(OperationKind::Head, key)?;
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        Ok(ObjectMetadata {
            content_type: object.content_type.clone(),
            user_metadata: object.user_metadata.clone(),
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
        let mut state = self.record(OperationKind::Put, key)?;
        let object = state.objects.entry(key.to_string()).or_default();
        object.body = body;
        object.content_type = content_type.map(ToString::to_string);
        object.user_metadata = metadata.clone();
        object.tags = tags.clone();
        Ok(())
    }

    async fn get_tags(&self, key: &str) -> StorageResult<TagSet> {
        let state = self.record(OperationKind::GetTags, key)?;
        state
            .objects
            .get(key)
            .map(|o| o.tags.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_tags(&self, key: &str, tags: &TagSet) -> StorageResult<()> {
        let mut state = self.record(OperationKind::PutTags, key)?;
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        object.tags = tags.clone();
        Ok(())
    }
}
