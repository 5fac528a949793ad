use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OcrGateError, Result};

/// The closed set of OCR backends this server knows how to build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendName {
    /// Local Tesseract engine.
    #[default]
    EasyOcr,
    /// Google Cloud Vision `images:annotate`.
    GoogleOcr,
}

impl BackendName {
    pub const ALL: [BackendName; 2] = [BackendName::EasyOcr, BackendName::GoogleOcr];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendName::EasyOcr => "easy_ocr",
            BackendName::GoogleOcr => "google_ocr",
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendName {
    type Err = OcrGateError;

    fn from_str(s: &str) -> Result<Self> {
        BackendName::ALL
            .into_iter()
            .find(|name| name.as_str() == s.trim())
            .ok_or_else(|| {
                OcrGateError::UnknownBackend(format!(
                    "'{}' (expected one of: {})",
                    s,
                    BackendName::ALL.map(|b| b.as_str()).join(", ")
                ))
            })
    }
}

/// Cache identity of a loaded model.
///
/// Languages are kept as a sorted, de-duplicated list rather than being
/// joined into a string, so no language code can ever alias a backend name
/// or another language list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    backend: BackendName,
    languages: Vec<String>,
}

impl ModelKey {
    pub fn new<S: AsRef<str>>(backend: BackendName, extra_langs: &[S]) -> Self {
        let mut languages: Vec<String> = extra_langs
            .iter()
            .map(|lang| lang.as_ref().trim())
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
            .collect();
        languages.sort();
        languages.dedup();

        Self { backend, languages }
    }

    pub fn backend(&self) -> BackendName {
        self.backend
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.languages.is_empty() {
            write!(f, "{}", self.backend)
        } else {
            write!(f, "{}--{}", self.backend, self.languages.join("_"))
        }
    }
}

/// Language codes end up on a Tesseract command line or in a JSON request,
/// so only the characters real codes use are accepted (`hi`, `chi_sim`, `zh-Hant`).
pub fn validate_language_code(code: &str) -> Result<()> {
    let valid = !code.is_empty()
        && code.len() <= 16
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(OcrGateError::Validation(format!(
            "Invalid language code '{code}'"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl BoundingBox {
    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        BoundingBox {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// What a backend produces for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

/// Response body of `POST /ocr`, also persisted as the sidecar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub backend: BackendName,
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub languages: Vec<String>,
    pub text: String,
    pub regions: Vec<TextRegion>,
}

impl OcrResult {
    pub fn new(
        key: &ModelKey,
        image: impl Into<String>,
        (width, height): (u32, u32),
        recognition: Recognition,
    ) -> Self {
        Self {
            backend: key.backend(),
            image: image.into(),
            width,
            height,
            languages: key.languages().to_vec(),
            text: recognition.text,
            regions: recognition.regions,
        }
    }
}
