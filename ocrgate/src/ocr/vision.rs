use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OcrGateError, Result};

use super::backend::{merge_languages, OcrModel, VisionSettings};
use super::types::{BackendName, BoundingBox, Recognition, TextRegion};

/// The key travels in a header so it never appears in request URLs,
/// which reqwest includes in its error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<EntityAnnotation>,
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

// Vision omits zero coordinates from vertices.
#[derive(Debug, Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i64,
    #[serde(default)]
    y: i64,
}

#[derive(Debug, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

impl BoundingPoly {
    fn to_bbox(&self) -> Option<BoundingBox> {
        let left = self.vertices.iter().map(|v| v.x).min()?;
        let top = self.vertices.iter().map(|v| v.y).min()?;
        let right = self.vertices.iter().map(|v| v.x).max()?;
        let bottom = self.vertices.iter().map(|v| v.y).max()?;
        Some(BoundingBox {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

/// Google Cloud Vision client serving the `google_ocr` backend.
pub struct GoogleVisionModel {
    client: Client,
    api_key: String,
    endpoint: String,
    feature: &'static str,
    languages: Vec<String>,
}

impl GoogleVisionModel {
    pub fn new(settings: VisionSettings, extra_langs: &[String]) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                OcrGateError::ModelLoad(format!(
                    "API key required for Google Vision OCR (set {})",
                    settings.api_key_env
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| OcrGateError::ModelLoad(format!("Failed to create HTTP client: {e}")))?;

        let languages = merge_languages(&settings.languages, extra_langs);
        info!(
            endpoint = %settings.endpoint,
            languages = %languages.join(","),
            "Google Vision OCR backend initialized"
        );

        Ok(Self {
            client,
            api_key,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            feature: settings.feature.as_str(),
            languages,
        })
    }

    async fn annotate(&self, image_bytes: &[u8]) -> Result<AnnotateImageResponse> {
        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(image_bytes),
                },
                features: vec![Feature { kind: self.feature }],
                image_context: (!self.languages.is_empty()).then(|| ImageContext {
                    language_hints: self.languages.clone(),
                }),
            }],
        };

        let response = self
            .client
            .post(format!("{}/images:annotate", self.endpoint))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrGateError::Http(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrGateError::Processing(format!(
                "Vision API request failed: {status} - {body}"
            )));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrGateError::Processing(format!("Failed to parse Vision response: {e}")))?;

        let image_response = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(error) = &image_response.error {
            return Err(OcrGateError::Processing(format!(
                "Vision API error: {}",
                error.message
            )));
        }
        Ok(image_response)
    }
}

#[async_trait]
impl OcrModel for GoogleVisionModel {
    fn backend(&self) -> BackendName {
        BackendName::GoogleOcr
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    async fn process(&self, image_path: &Path) -> Result<Recognition> {
        let image_bytes = tokio::fs::read(image_path).await?;
        debug!(image = %image_path.display(), bytes = image_bytes.len(), "Calling Vision API");

        let response = self.annotate(&image_bytes).await?;

        // The first text annotation is the whole-image block; the rest are words.
        let mut annotations = response.text_annotations.into_iter();
        let full_block = annotations.next();
        let regions = annotations
            .map(|a| TextRegion {
                bbox: a.bounding_poly.as_ref().and_then(BoundingPoly::to_bbox),
                text: a.description,
                confidence: None,
            })
            .collect();

        let text = response
            .full_text_annotation
            .map(|t| t.text)
            .or_else(|| full_block.map(|b| b.description))
            .unwrap_or_default();

        Ok(Recognition {
            text: text.trim().to_string(),
            regions,
        })
    }
}
