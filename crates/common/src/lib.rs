//! Common types shared by the colorspace normalizer crates

use serde::{Deserialize, Serialize};

/// Tag holding the number of failed fetch attempts across invocations
pub const RETRY_COUNT_TAG: &str = "retryCount";

/// Terminal marker written at upload time once an object is converted
pub const PROCESSED_TAG: &str = "isRgbProcessed";

/// Terminal marker written by the first generation of the converter
pub const LEGACY_PROCESSED_TAG: &str = "isCmykProcessed";

/// Wall-clock seconds the conversion took, for observability only
pub const CONVERSION_TIME_TAG: &str = "conversionTimeSec";

/// Value stored under presence-flag tags
pub const FLAG_VALUE: &str = "true";

/// A single object tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered set of object tags with unique keys
///
/// Order is kept only so that writes are reproducible; lookups never depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the tag named `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace any tag with the same key, then append the new one
    pub fn upsert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.tags.retain(|t| t.key != key);
        self.tags.push(Tag {
            key,
            value: value.into(),
        });
    }

    /// Builder-style variant of [`TagSet::upsert`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.upsert(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Encode as the `k1=v1&k2=v2` query string S3 expects for upload-time tagging
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for tag in &self.tags {
            serializer.append_pair(&tag.key, &tag.value);
        }
        serializer.finish()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.upsert(tag.key, tag.value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// Last path segment of an object key, used when no better file name is known
#[must_use]
pub fn file_name_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Absolute URL path for an object key, each segment percent-encoded
///
/// `/` separators are kept; everything a URL path cannot carry verbatim
/// (spaces, `%`, `#`, `?`) is escaped.
#[must_use]
pub fn encode_key_path(key: &str) -> String {
    let key = key.trim_start_matches('/');
    let Ok(mut url) = url::Url::parse("http://localhost/") else {
        return format!("/{key}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().extend(key.split('/'));
    }
    url.path().to_string()
}
