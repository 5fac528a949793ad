use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        State,
    },
    http::StatusCode,
    response::Html,
    Json,
};
use tracing::{debug, info};

use crate::api::state::AppState;
use crate::error::{OcrGateError, Result};
use crate::ocr::{inspect_image, validate_language_code, BackendName, ModelKey, OcrResult};
use crate::storage;

/// Upper bound on distinct extra languages per request; each distinct set
/// is a separately cached model.
const MAX_ADDITIONAL_LANGS: usize = 8;

impl From<MultipartRejection> for OcrGateError {
    fn from(rejection: MultipartRejection) -> Self {
        OcrGateError::Validation(rejection.body_text())
    }
}

fn multipart_error(err: MultipartError) -> OcrGateError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OcrGateError::PayloadTooLarge(err.body_text())
    } else {
        OcrGateError::Validation(format!("Malformed multipart request: {}", err.body_text()))
    }
}

#[derive(Debug)]
struct OcrUpload {
    file_name: String,
    bytes: Bytes,
    backend: BackendName,
    languages: Vec<String>,
}

impl OcrUpload {
    /// Fields: `image` (required file), `config` (backend name), and any
    /// number of `additional_langs` values, each optionally comma-separated.
    async fn from_multipart(multipart: &mut Multipart, default_backend: BackendName) -> Result<Self> {
        let mut image: Option<(String, Bytes)> = None;
        let mut backend = default_backend;
        let mut languages: Vec<String> = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "image" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    image = Some((file_name, bytes));
                }
                "config" => {
                    let raw = field.text().await.map_err(multipart_error)?;
                    if !raw.trim().is_empty() {
                        backend = raw.parse()?;
                    }
                }
                "additional_langs" => {
                    let raw = field.text().await.map_err(multipart_error)?;
                    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                        validate_language_code(code)?;
                        languages.push(code.to_string());
                    }
                }
                other => debug!(field = other, "Ignoring unknown multipart field"),
            }
        }

        let (file_name, bytes) = image.ok_or_else(|| {
            OcrGateError::Validation("Missing required 'image' field".to_string())
        })?;

        languages.sort();
        languages.dedup();
        if languages.len() > MAX_ADDITIONAL_LANGS {
            return Err(OcrGateError::Validation(format!(
                "Too many additional languages: {} (max {MAX_ADDITIONAL_LANGS})",
                languages.len()
            )));
        }

        Ok(Self {
            file_name,
            bytes,
            backend,
            languages,
        })
    }
}

/// `POST /ocr`
///
/// Persist the upload, resolve the cached model for the requested backend
/// and languages, run recognition, write the sidecar, return the result.
/// A failure at any step aborts the request; an already stored upload is
/// left in place.
pub async fn run_ocr(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResult>> {
    let started = Instant::now();
    let mut multipart = multipart?;
    let upload = OcrUpload::from_multipart(&mut multipart, state.config.ocr.default_backend).await?;
    let image = inspect_image(&upload.bytes)?;

    let image_path =
        storage::store(&upload.file_name, &upload.bytes, &state.config.ocr.output_dir).await?;
    let stored_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let key = ModelKey::new(upload.backend, &upload.languages);
    let model = state.models.get_or_load(key.clone()).await?;

    let timeout_secs = state.config.ocr.process_timeout_secs;
    let recognition = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        model.process(&image_path),
    )
    .await
    .map_err(|_| {
        OcrGateError::Timeout(format!(
            "OCR processing timed out after {timeout_secs} seconds"
        ))
    })??;

    let result = OcrResult::new(&key, stored_name, (image.width, image.height), recognition);
    storage::write_sidecar(&image_path, &result).await?;

    info!(
        model = %key,
        image = %result.image,
        mime = %image.mime_type,
        regions = result.regions.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "OCR request completed"
    );

    Ok(Json(result))
}

/// `GET /ocr_test`: manual upload form.
pub async fn ocr_test_form() -> Html<String> {
    let options: String = BackendName::ALL
        .iter()
        .map(|b| format!("<option value=\"{b}\">{b}</option>"))
        .collect();

    Html(format!(
        r#"<!doctype html>
<html>
<body>
<form action="/ocr" enctype="multipart/form-data" method="post">
<p><input name="image" type="file" accept="image/*" required></p>
<p><label>Backend <select name="config">{options}</select></label></p>
<p><label>Additional languages <input name="additional_langs" type="text" placeholder="hi,ta"></label></p>
<input type="submit">
</form>
</body>
</html>
"#
    ))
}
