//! Object-created notification model
//!
//! Mirrors the storage event document: `{"Records":[{"eventName":..,"s3":{..}}]}`.
//! Keys arrive form-encoded and are decoded on access.

use crate::OrchestratorError;
use serde::{Deserialize, Serialize};

/// One invocation's worth of change records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Bucket {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    /// Form-encoded key as delivered
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl NotificationBatch {
    /// Parse the raw invocation payload
    pub fn from_value(value: serde_json::Value) -> Result<Self, OrchestratorError> {
        serde_json::from_value(value).map_err(|e| OrchestratorError::InvalidEvent(e.to_string()))
    }

    /// Build a batch of created-object records for already-decoded keys
    pub fn from_keys<I, S>(bucket: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records = keys
            .into_iter()
            .map(|key| ChangeRecord {
                event_name: "ObjectCreated:Put".to_string(),
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: bucket.to_string(),
                    },
                    object: S3Object {
                        key: encode_key(key.as_ref()),
                        size: None,
                    },
                },
            })
            .collect();
        Self { records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ChangeRecord {
    /// Decoded object key
    #[must_use]
    pub fn key(&self) -> String {
        decode_key(&self.s3.object.key)
    }

    /// Bucket the record names, if any
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        Some(self.s3.bucket.name.as_str()).filter(|name| !name.is_empty())
    }
}

/// Decode a notification key (`+` is a space, `%XX` a byte)
#[must_use]
pub fn decode_key(raw: &str) -> String {
    // Literal separators are part of the key, not pair delimiters
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(name, _)| name.into_owned())
        .unwrap_or_default()
}

fn encode_key(key: &str) -> String {
    url::form_urlencoded::byte_serialize(key.as_bytes())
        .collect::<String>()
        .replace("%2F", "/")
}
