//! Normalizer configuration
//!
//! Loaded from environment variables (the Lambda deployment) or a YAML file, then
//! validated before any collaborator is built.

use crate::retry::Backoff;
use normalizer_common::{encode_key_path, LEGACY_PROCESSED_TAG, PROCESSED_TAG};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn default_alert_secret_field() -> String {
    "slack_bot_token".to_string()
}

fn default_alert_channel() -> String {
    "#image-pipeline-alerts".to_string()
}

fn default_alert_api_url() -> String {
    "https://slack.com/api/chat.postMessage".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_conversion_attempts() -> u32 {
    3
}

fn default_processed_tag() -> String {
    PROCESSED_TAG.to_string()
}

fn default_legacy_processed_tags() -> Vec<String> {
    vec![LEGACY_PROCESSED_TAG.to_string()]
}

fn default_original_name_metadata_key() -> String {
    "original-filename".to_string()
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_alert_timeout_secs() -> u64 {
    10
}

/// Complete normalizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Bucket whose uploads are normalized
    pub bucket: String,

    /// Only keys under this prefix are processed (e.g. "smartsell/pages_1/")
    pub watched_prefix: String,

    /// Public base URL objects are served from
    pub cdn_base_url: String,

    pub cdn_distribution_id: String,

    /// Secrets store id of the alert token; alerts are only logged when unset
    #[serde(default)]
    pub alert_secret_id: Option<String>,

    #[serde(default = "default_alert_secret_field")]
    pub alert_secret_field: String,

    #[serde(default = "default_alert_channel")]
    pub alert_channel: String,

    #[serde(default = "default_alert_api_url")]
    pub alert_api_url: String,

    #[serde(default = "default_alert_timeout_secs")]
    pub alert_timeout_secs: u64,

    /// Failed fetches tolerated across invocations before an object is given up on
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// In-process decode/convert/encode attempts per invocation
    #[serde(default = "default_max_conversion_attempts")]
    pub max_conversion_attempts: u32,

    /// Delay between conversion attempts
    #[serde(default)]
    pub conversion_backoff: Backoff,

    /// Terminal marker written on upload
    #[serde(default = "default_processed_tag")]
    pub processed_tag: String,

    /// Older terminal markers that also mean "already converted"
    #[serde(default = "default_legacy_processed_tags")]
    pub legacy_processed_tags: Vec<String>,

    /// User metadata key holding the uploaded file name
    #[serde(default = "default_original_name_metadata_key")]
    pub original_name_metadata_key: String,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Custom S3 endpoint, e.g. `MinIO` for local runs
    #[serde(default)]
    pub s3_endpoint: Option<String>,
}

impl NormalizerConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load from any variable source; empty values count as unset
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| get(name).ok_or_else(|| ConfigError::Missing(name.to_string()));

        let conversion_backoff = match parse_var::<u64>(&get, "CONVERSION_BACKOFF_MS")? {
            Some(0) | None => Backoff::None,
            Some(delay_ms) => Backoff::Fixed { delay_ms },
        };

        let config = Self {
            bucket: required("TARGET_BUCKET")?,
            watched_prefix: required("WATCHED_PREFIX")?,
            cdn_base_url: required("CDN_BASE_URL")?,
            cdn_distribution_id: required("CDN_DISTRIBUTION_ID")?,
            alert_secret_id: get("ALERT_SECRET_ID"),
            alert_secret_field: get("ALERT_SECRET_FIELD").unwrap_or_else(default_alert_secret_field),
            alert_channel: get("ALERT_CHANNEL").unwrap_or_else(default_alert_channel),
            alert_api_url: get("ALERT_API_URL").unwrap_or_else(default_alert_api_url),
            alert_timeout_secs: parse_var(&get, "ALERT_TIMEOUT_SECS")?
                .unwrap_or_else(default_alert_timeout_secs),
            max_retries: parse_var(&get, "MAX_RETRIES")?.unwrap_or_else(default_max_retries),
            max_conversion_attempts: parse_var(&get, "MAX_CONVERSION_ATTEMPTS")?
                .unwrap_or_else(default_max_conversion_attempts),
            conversion_backoff,
            processed_tag: get("PROCESSED_TAG").unwrap_or_else(default_processed_tag),
            legacy_processed_tags: get("LEGACY_PROCESSED_TAGS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_else(default_legacy_processed_tags),
            original_name_metadata_key: get("ORIGINAL_NAME_METADATA_KEY")
                .unwrap_or_else(default_original_name_metadata_key),
            jpeg_quality: parse_var(&get, "JPEG_QUALITY")?.unwrap_or_else(default_jpeg_quality),
            s3_endpoint: get("S3_ENDPOINT"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &str, reason: &str| ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.bucket.trim().is_empty() {
            return Err(invalid("bucket", "must not be empty"));
        }
        if self.watched_prefix.trim().is_empty() {
            return Err(invalid("watched_prefix", "must not be empty"));
        }
        if self.cdn_distribution_id.trim().is_empty() {
            return Err(invalid("cdn_distribution_id", "must not be empty"));
        }
        if self.processed_tag.trim().is_empty() {
            return Err(invalid("processed_tag", "must not be empty"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        if self.max_conversion_attempts == 0 {
            return Err(invalid("max_conversion_attempts", "must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(invalid("jpeg_quality", "must be between 1 and 100"));
        }

        let cdn = url::Url::parse(&self.cdn_base_url)
            .map_err(|e| invalid("cdn_base_url", &e.to_string()))?;
        if !matches!(cdn.scheme(), "http" | "https") {
            return Err(invalid("cdn_base_url", "must be an http(s) URL"));
        }

        Ok(())
    }

    /// Whether a key falls under the watched prefix
    #[must_use]
    pub fn is_watched(&self, key: &str) -> bool {
        key.starts_with(&self.watched_prefix)
    }

    /// Public URL of an object, with the key percent-encoded
    #[must_use]
    pub fn cdn_url(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.cdn_base_url.trim_end_matches('/'),
            encode_key_path(key)
        )
    }

    /// Every tag name whose presence marks an object as converted
    #[must_use]
    pub fn processed_markers(&self) -> Vec<String> {
        std::iter::once(self.processed_tag.clone())
            .chain(self.legacy_processed_tags.iter().cloned())
            .collect()
    }
}

fn parse_var<T: FromStr>(
    get: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                name: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = [
            ("TARGET_BUCKET", "media-bucket"),
            ("WATCHED_PREFIX", "smartsell/pages_1/"),
            ("CDN_BASE_URL", "https://cdn.example.com/"),
            ("CDN_DISTRIBUTION_ID", "E2ABCDEF"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        vars
    }

    fn load(vars: &HashMap<String, String>) -> Result<NormalizerConfig, ConfigError> {
        NormalizerConfig::from_lookup(&|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&env(&[])).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_conversion_attempts, 3);
        assert_eq!(config.conversion_backoff, Backoff::None);
        assert_eq!(config.processed_tag, "isRgbProcessed");
        assert_eq!(config.processed_markers(), vec!["isRgbProcessed", "isCmykProcessed"]);
        assert_eq!(config.alert_secret_id, None);
        assert_eq!(config.jpeg_quality, 95);
    }

    #[test]
    fn test_missing_required_setting() {
        let mut vars = env(&[]);
        vars.remove("CDN_DISTRIBUTION_ID");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == "CDN_DISTRIBUTION_ID"));

        let err = load(&env(&[("TARGET_BUCKET", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == "TARGET_BUCKET"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&env(&[
            ("MAX_RETRIES", "5"),
            ("CONVERSION_BACKOFF_MS", "250"),
            ("LEGACY_PROCESSED_TAGS", "isCmykProcessed, converted ,"),
            ("ALERT_SECRET_ID", "prod/alerts"),
        ]))
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.conversion_backoff, Backoff::Fixed { delay_ms: 250 });
        assert_eq!(config.legacy_processed_tags, vec!["isCmykProcessed", "converted"]);
        assert_eq!(config.alert_secret_id.as_deref(), Some("prod/alerts"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&env(&[("MAX_RETRIES", "three")])),
            Err(ConfigError::Invalid { name, .. }) if name == "MAX_RETRIES"
        ));
        assert!(load(&env(&[("MAX_CONVERSION_ATTEMPTS", "0")])).is_err());
        assert!(load(&env(&[("CDN_BASE_URL", "not a url")])).is_err());
        assert!(load(&env(&[("CDN_BASE_URL", "ftp://cdn.example.com")])).is_err());
        assert!(load(&env(&[("JPEG_QUALITY", "101")])).is_err());
    }

    #[test]
    fn test_cdn_url_and_watch() {
        let config = load(&env(&[])).unwrap();
        assert_eq!(
            config.cdn_url("smartsell/pages_1/a.jpg"),
            "https://cdn.example.com/smartsell/pages_1/a.jpg"
        );
        assert!(config.is_watched("smartsell/pages_1/a.jpg"));
        assert!(!config.is_watched("smartsell/pages_2/a.jpg"));
        assert!(!config.is_watched("other/x.jpg"));
    }

    #[test]
    fn test_cdn_url_encodes_key() {
        let config = load(&env(&[])).unwrap();
        assert_eq!(
            config.cdn_url("smartsell/pages_1/My Poster#2.jpg"),
            "https://cdn.example.com/smartsell/pages_1/My%20Poster%232.jpg"
        );
    }

    #[test]
    fn test_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normalizer.yaml");
        std::fs::write(
            &path,
            "bucket: media-bucket\n\
             watched_prefix: ns/pages_1/\n\
             cdn_base_url: https://cdn.example.com\n\
             cdn_distribution_id: E2ABCDEF\n\
             max_conversion_attempts: 4\n\
             conversion_backoff:\n  kind: exponential\n  initial_ms: 100\n  max_ms: 1000\n",
        )
        .unwrap();

        let config = NormalizerConfig::from_yaml(&path).unwrap();
        assert_eq!(config.max_conversion_attempts, 4);
        assert_eq!(config.max_retries, 3);
        assert_eq!(
            config.conversion_backoff,
            Backoff::Exponential {
                initial_ms: 100,
                max_ms: 1000
            }
        );
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normalizer.yaml");
        std::fs::write(
            &path,
            "bucket: media-bucket\nwatched_prefix: ''\ncdn_base_url: https://cdn.example.com\ncdn_distribution_id: E1\n",
        )
        .unwrap();

        assert!(matches!(
            NormalizerConfig::from_yaml(&path),
            Err(ConfigError::Invalid { name, .. }) if name == "watched_prefix"
        ));
    }
}
