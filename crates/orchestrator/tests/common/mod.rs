//! Shared fakes for pipeline tests
#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use normalizer_alerting::{Alert, AlertDispatcher};
use normalizer_cdn::{invalidation_path, CacheInvalidator, CdnError, CdnResult};
use normalizer_colorspace::{
    Colorspace, ColorspaceError, DecodedImage, ImageCodec, Result as CodecResult, StandardCodec,
};
use normalizer_orchestrator::{
    BatchResult, Collaborators, NormalizerConfig, NotificationBatch, Orchestrator,
};
use normalizer_storage::{MemoryObject, MemoryObjectStorage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BUCKET: &str = "media-bucket";
pub const PREFIX: &str = "ns/pages_1/";
pub const CDN_BASE_URL: &str = "https://cdn.example.com";

/// Bytes the scripted codec decodes as CMYK
pub const CMYK_IMAGE: &[u8] = b"CMYK test image";
/// Bytes the scripted codec decodes as RGB
pub const RGB_IMAGE: &[u8] = b"RGB test image";
/// Bytes the scripted codec decodes as RGBA
pub const RGBA_IMAGE: &[u8] = b"RGBA test image";
/// What the scripted codec produces for every successful encode
pub const CONVERTED_IMAGE: &[u8] = b"converted RGB image";

pub fn test_config() -> NormalizerConfig {
    config_with(&[])
}

/// Test configuration with extra environment-style overrides
pub fn config_with(overrides: &[(&str, &str)]) -> NormalizerConfig {
    let mut vars: HashMap<String, String> = [
        ("TARGET_BUCKET", BUCKET),
        ("WATCHED_PREFIX", PREFIX),
        ("CDN_BASE_URL", CDN_BASE_URL),
        ("CDN_DISTRIBUTION_ID", "E2TESTDIST"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    NormalizerConfig::from_lookup(&|name| vars.get(name).cloned()).unwrap()
}

/// Codec keyed on content prefixes, with a scriptable number of encode failures
#[derive(Default)]
pub struct ScriptedCodec {
    encode_failures: AtomicUsize,
    decodes: AtomicUsize,
    encodes: AtomicUsize,
}

impl ScriptedCodec {
    /// Fail the next `n` encodes
    pub fn fail_encodes(&self, n: usize) {
        self.encode_failures.store(n, Ordering::SeqCst);
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }
}

impl ImageCodec for ScriptedCodec {
    fn decode(&self, bytes: &[u8]) -> CodecResult<DecodedImage> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if bytes.starts_with(b"CMYK") {
            DecodedImage::from_cmyk(
                2,
                1,
                vec![0, 0, 0, 0, 0, 255, 255, 0],
                false,
                Colorspace::Cmyk,
                ImageFormat::Jpeg,
            )
        } else if bytes.starts_with(b"RGBA") {
            Ok(DecodedImage::from_dynamic(
                DynamicImage::ImageRgba8(RgbaImage::new(2, 1)),
                ImageFormat::Png,
            ))
        } else if bytes.starts_with(b"RGB") {
            Ok(DecodedImage::from_dynamic(
                DynamicImage::ImageRgb8(RgbImage::new(2, 1)),
                ImageFormat::Jpeg,
            ))
        } else {
            Err(ColorspaceError::DecodeError("unrecognized test image".to_string()))
        }
    }

    fn encode(&self, image: &DecodedImage) -> CodecResult<Vec<u8>> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        let pending = self.encode_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.encode_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ColorspaceError::EncodeError("scripted encode failure".to_string()));
        }
        assert!(image.colorspace().is_target(), "encoding unconverted pixels");
        Ok(CONVERTED_IMAGE.to_vec())
    }
}

/// Collects alerts instead of sending them
#[derive(Default)]
pub struct RecordingDispatcher {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingDispatcher {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Records invalidated paths; can be switched to fail
#[derive(Default)]
pub struct RecordingInvalidator {
    paths: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingInvalidator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, object_key: &str) -> CdnResult<String> {
        self.paths.lock().unwrap().push(invalidation_path(object_key));
        if self.failing.load(Ordering::SeqCst) {
            return Err(CdnError::CloudFrontError("distribution unavailable".to_string()));
        }
        Ok(format!("I{}", self.paths.lock().unwrap().len()))
    }
}

/// Orchestrator wired to in-memory fakes
pub struct Harness {
    pub storage: Arc<MemoryObjectStorage>,
    pub codec: Arc<ScriptedCodec>,
    pub alerts: Arc<RecordingDispatcher>,
    pub invalidator: Arc<RecordingInvalidator>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        let codec = Arc::new(ScriptedCodec::default());
        Self::build(config, codec.clone(), codec)
    }

    /// Harness decoding real image bytes
    pub fn with_standard_codec() -> Self {
        Self::build(
            test_config(),
            Arc::new(ScriptedCodec::default()),
            Arc::new(StandardCodec::default()),
        )
    }

    fn build(
        config: NormalizerConfig,
        scripted: Arc<ScriptedCodec>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let storage = Arc::new(MemoryObjectStorage::new(BUCKET));
        let alerts = Arc::new(RecordingDispatcher::default());
        let invalidator = Arc::new(RecordingInvalidator::default());

        let orchestrator = Orchestrator::new(
            config,
            Collaborators {
                storage: storage.clone(),
                codec,
                alerts: alerts.clone(),
                invalidator: invalidator.clone(),
            },
        );

        Self {
            storage,
            codec: scripted,
            alerts,
            invalidator,
            orchestrator,
        }
    }

    /// Upload a JPEG object with no tags
    pub fn add(&self, key: &str, body: &[u8]) {
        self.storage
            .insert(key, MemoryObject::new(body, Some("image/jpeg")));
    }

    pub fn add_object(&self, key: &str, object: MemoryObject) {
        self.storage.insert(key, object);
    }

    /// Run one batch of created-object records for `keys`
    pub async fn run(&self, keys: &[&str]) -> BatchResult {
        self.orchestrator
            .process_batch(&NotificationBatch::from_keys(BUCKET, keys))
            .await
    }
}

/// A real 4-channel JPEG filled with one ink value
pub fn cmyk_jpeg(width: usize, height: usize, ink: [u8; 4]) -> Vec<u8> {
    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_CMYK);
    comp.set_size(width, height);
    comp.set_quality(90.0);
    let mut started = comp.start_compress(Vec::new()).unwrap();
    started.write_scanlines(&ink.repeat(width * height)).unwrap();
    started.finish().unwrap()
}
