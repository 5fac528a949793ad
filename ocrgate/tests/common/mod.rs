// Common test utilities for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageBuffer, ImageFormat, Rgb};
use tempfile::TempDir;

use ocrgate::api::{create_router, AppState};
use ocrgate::auth::{AuthGate, Credentials};
use ocrgate::config::{AuthConfig, Config, OcrConfig, ServerConfig};
use ocrgate::error::{OcrGateError, Result};
use ocrgate::ocr::{
    BackendName, BoundingBox, ModelFactory, ModelKey, OcrModel, Recognition, TextRegion,
};

pub const USERNAME: &str = "ocr-admin";
pub const PASSWORD: &str = "correct horse battery staple";
pub const BOUNDARY: &str = "ocrgate-test-boundary";

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Stand-in model: echoes which backend and languages processed the file.
pub struct FakeModel {
    backend: BackendName,
    languages: Vec<String>,
    fail_processing: bool,
    delay: Duration,
}

#[async_trait]
impl OcrModel for FakeModel {
    fn backend(&self) -> BackendName {
        self.backend
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    async fn process(&self, image_path: &Path) -> Result<Recognition> {
        tokio::time::sleep(self.delay).await;
        if self.fail_processing {
            return Err(OcrGateError::Processing("engine crashed".to_string()));
        }
        if !image_path.exists() {
            return Err(OcrGateError::Processing(format!(
                "image not persisted: {}",
                image_path.display()
            )));
        }

        let text = format!("{} [{}]", self.backend, self.languages.join(","));
        Ok(Recognition {
            text: text.clone(),
            regions: vec![TextRegion {
                text,
                confidence: Some(0.99),
                bbox: Some(BoundingBox {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                }),
            }],
        })
    }
}

/// Records every construction so tests can assert cache behavior.
#[derive(Default)]
pub struct RecordingFactory {
    constructions: Mutex<Vec<ModelKey>>,
    fail_next: AtomicBool,
    fail_processing: AtomicBool,
    processing_delay: Mutex<Duration>,
}

impl RecordingFactory {
    pub fn constructions(&self) -> Vec<ModelKey> {
        self.constructions.lock().unwrap().clone()
    }

    pub fn fail_next_construction(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn build_failing_models(&self) {
        self.fail_processing.store(true, Ordering::SeqCst);
    }

    pub fn build_slow_models(&self, delay: Duration) {
        *self.processing_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl ModelFactory for RecordingFactory {
    async fn construct(&self, key: &ModelKey) -> Result<Arc<dyn OcrModel>> {
        self.constructions.lock().unwrap().push(key.clone());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(OcrGateError::ModelLoad("language pack missing".to_string()));
        }
        Ok(Arc::new(FakeModel {
            backend: key.backend(),
            languages: key.languages().to_vec(),
            fail_processing: self.fail_processing.load(Ordering::SeqCst),
            delay: *self.processing_delay.lock().unwrap(),
        }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub factory: Arc<RecordingFactory>,
    pub output_dir: TempDir,
}

impl TestApp {
    pub fn new(enforce_auth: bool) -> Self {
        Self::with_upload_limit(enforce_auth, 10 * 1024 * 1024)
    }

    pub fn with_upload_limit(enforce_auth: bool, max_upload_bytes: usize) -> Self {
        Self::with_limits(enforce_auth, max_upload_bytes, 5)
    }

    pub fn with_limits(
        enforce_auth: bool,
        max_upload_bytes: usize,
        process_timeout_secs: u64,
    ) -> Self {
        init_test_logger();

        let output_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_upload_bytes,
                log_format: "text".to_string(),
            },
            auth: AuthConfig {
                credentials_path: PathBuf::from("unused.json"),
                enforce: enforce_auth,
            },
            ocr: OcrConfig {
                configs_path: "configs/*.json".to_string(),
                default_backend: BackendName::EasyOcr,
                output_dir: output_dir.path().to_path_buf(),
                load_timeout_secs: 5,
                process_timeout_secs,
            },
        };
        let credentials = Credentials {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
        };

        let factory = Arc::new(RecordingFactory::default());
        let state = AppState::new(
            config,
            AuthGate::new(&credentials, enforce_auth),
            factory.clone(),
        );

        Self {
            router: create_router(state),
            factory,
            output_dir,
        }
    }

    /// File names currently in the output directory, sorted.
    pub fn written_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.output_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([250u8, 250, 250]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    out
}

pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{username}:{password}"))
    )
}

pub fn ocr_request(credentials: Option<(&str, &str)>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ocr")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len());
    if let Some((username, password)) = credentials {
        builder = builder.header(header::AUTHORIZATION, basic_auth(username, password));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
