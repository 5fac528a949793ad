use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{OcrGateError, Result};

use super::tesseract::TesseractModel;
use super::types::{BackendName, ModelKey, Recognition};
use super::vision::GoogleVisionModel;

/// A constructed, ready-to-use OCR model.
///
/// Instances are shared read-only between concurrent requests, so any
/// engine state that needs mutation must be guarded internally.
#[async_trait]
pub trait OcrModel: Send + Sync {
    fn backend(&self) -> BackendName;

    /// Every language the model was built with, base config included.
    fn languages(&self) -> &[String];

    async fn process(&self, image_path: &Path) -> Result<Recognition>;
}

/// Builds models on a cache miss. Construction may be slow (weights,
/// language packs, credentials), which is why results are cached.
#[async_trait]
pub trait ModelFactory: Send + Sync {
    async fn construct(&self, key: &ModelKey) -> Result<Arc<dyn OcrModel>>;
}

fn default_tesseract_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_tesseract_binary() -> String {
    "tesseract".to_string()
}

fn default_psm() -> u8 {
    3
}

fn default_oem() -> u8 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct TesseractSettings {
    #[serde(default = "default_tesseract_languages")]
    pub languages: Vec<String>,
    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
    #[serde(default = "default_psm")]
    pub psm: u8,
    #[serde(default = "default_oem")]
    pub oem: u8,
    #[serde(default = "default_tesseract_binary")]
    pub binary: String,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            languages: default_tesseract_languages(),
            tessdata_dir: None,
            psm: default_psm(),
            oem: default_oem(),
            binary: default_tesseract_binary(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisionFeature {
    DocumentTextDetection,
    TextDetection,
}

impl VisionFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionFeature::DocumentTextDetection => "DOCUMENT_TEXT_DETECTION",
            VisionFeature::TextDetection => "TEXT_DETECTION",
        }
    }
}

fn default_vision_endpoint() -> String {
    "https://vision.googleapis.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_VISION_API_KEY".to_string()
}

fn default_vision_feature() -> VisionFeature {
    VisionFeature::DocumentTextDetection
}

fn default_vision_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionSettings {
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_vision_feature")]
    pub feature: VisionFeature,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            api_key_env: default_api_key_env(),
            feature: default_vision_feature(),
            languages: Vec::new(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

/// Parsed contents of one backend's configuration resource.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Tesseract(TesseractSettings),
    Vision(VisionSettings),
}

impl BackendConfig {
    /// Resolve `pattern` (e.g. `configs/*.json`) for `backend` and parse it.
    pub async fn load(pattern: &str, backend: BackendName) -> Result<Self> {
        let path = config_path(pattern, backend);
        debug!(backend = %backend, path = %path.display(), "Reading backend configuration");

        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            OcrGateError::Configuration(format!(
                "Cannot read configuration for {backend} at {}: {e}",
                path.display()
            ))
        })?;

        Self::parse(backend, &raw).map_err(|e| {
            OcrGateError::Configuration(format!(
                "Invalid configuration for {backend} at {}: {e}",
                path.display()
            ))
        })
    }

    pub fn parse(backend: BackendName, raw: &str) -> serde_json::Result<Self> {
        Ok(match backend {
            BackendName::EasyOcr => BackendConfig::Tesseract(serde_json::from_str(raw)?),
            BackendName::GoogleOcr => BackendConfig::Vision(serde_json::from_str(raw)?),
        })
    }
}

pub fn config_path(pattern: &str, backend: BackendName) -> PathBuf {
    PathBuf::from(pattern.replace('*', backend.as_str()))
}

/// Production factory: reads the backend's configuration resource and
/// builds the matching engine with the requested extra languages.
pub struct BackendFactory {
    configs_path: String,
}

impl BackendFactory {
    pub fn new(configs_path: impl Into<String>) -> Self {
        Self {
            configs_path: configs_path.into(),
        }
    }
}

#[async_trait]
impl ModelFactory for BackendFactory {
    async fn construct(&self, key: &ModelKey) -> Result<Arc<dyn OcrModel>> {
        let config = BackendConfig::load(&self.configs_path, key.backend()).await?;

        let model: Arc<dyn OcrModel> = match config {
            BackendConfig::Tesseract(settings) => {
                Arc::new(TesseractModel::load(settings, key.languages()).await?)
            }
            BackendConfig::Vision(settings) => {
                Arc::new(GoogleVisionModel::new(settings, key.languages())?)
            }
        };

        Ok(model)
    }
}

/// Base languages followed by extras, without duplicates, order kept.
pub(crate) fn merge_languages(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for lang in base.iter().chain(extra) {
        if !merged.contains(lang) {
            merged.push(lang.clone());
        }
    }
    merged
}
