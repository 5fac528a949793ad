//! OCR backends and the model cache.
//!
//! # Architecture
//!
//! - [`BackendName`] enumerates the selectable backends (`easy_ocr`, `google_ocr`)
//! - [`OcrModel`] is the capability every constructed backend exposes
//! - [`ModelFactory`] builds a model for a [`ModelKey`]; [`BackendFactory`]
//!   is the production implementation reading `configs/<backend>.json`
//! - [`ModelCache`] memoizes constructed models for the life of the process
//!
//! # Backends
//!
//! - `easy_ocr`: local Tesseract, through the CLI or in-process with the
//!   `leptess` feature
//! - `google_ocr`: Google Cloud Vision `images:annotate`
//!
//! # Usage
//!
//! ```rust,ignore
//! let cache = ModelCache::new(Arc::new(BackendFactory::new("configs/*.json")), timeout);
//! let model = cache.resolve("google_ocr", &["hi", "ta"]).await?;
//! let recognition = model.process(&image_path).await?;
//! ```

mod backend;
mod cache;
mod preprocessing;
mod tesseract;
mod types;
mod vision;

pub use backend::{
    config_path, BackendConfig, BackendFactory, ModelFactory, OcrModel, TesseractSettings,
    VisionFeature, VisionSettings,
};
pub use cache::ModelCache;
pub use preprocessing::{inspect_image, ImageInfo};
pub use tesseract::{tesseract_language, TesseractModel};
pub use types::{
    validate_language_code, BackendName, BoundingBox, ModelKey, OcrResult, Recognition,
    TextRegion,
};
pub use vision::GoogleVisionModel;
