use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{OcrGateError, Result};

use super::backend::{merge_languages, OcrModel, TesseractSettings};
use super::types::{BackendName, BoundingBox, Recognition, TextRegion};

/// Two-letter codes clients send, mapped to Tesseract traineddata names.
/// Anything not listed is passed through unchanged (`chi_sim`, `san`, ...).
const ISO_TO_TESSERACT: &[(&str, &str)] = &[
    ("as", "asm"),
    ("bn", "ben"),
    ("de", "deu"),
    ("en", "eng"),
    ("es", "spa"),
    ("fr", "fra"),
    ("gu", "guj"),
    ("hi", "hin"),
    ("kn", "kan"),
    ("ml", "mal"),
    ("mr", "mar"),
    ("ne", "nep"),
    ("or", "ori"),
    ("pa", "pan"),
    ("sa", "san"),
    ("ta", "tam"),
    ("te", "tel"),
    ("ur", "urd"),
];

pub fn tesseract_language(code: &str) -> String {
    ISO_TO_TESSERACT
        .iter()
        .find(|(iso, _)| *iso == code)
        .map(|(_, tess)| (*tess).to_string())
        .unwrap_or_else(|| code.to_string())
}

enum Engine {
    Cli {
        binary: String,
        tessdata_dir: Option<PathBuf>,
    },
    #[cfg(feature = "leptess")]
    InProcess {
        tesseract: std::sync::Arc<tokio::sync::Mutex<leptess::LepTess>>,
    },
}

/// Tesseract-backed model serving the `easy_ocr` backend.
pub struct TesseractModel {
    engine: Engine,
    languages: Vec<String>,
    psm: u8,
    oem: u8,
}

impl TesseractModel {
    /// Checks that the engine and every requested language pack are present
    /// before the model is handed to the cache.
    pub async fn load(settings: TesseractSettings, extra_langs: &[String]) -> Result<Self> {
        let extra: Vec<String> = extra_langs.iter().map(|l| tesseract_language(l)).collect();
        let languages = merge_languages(&settings.languages, &extra);
        if languages.is_empty() {
            return Err(OcrGateError::Configuration(
                "easy_ocr configuration lists no languages".to_string(),
            ));
        }

        let engine = Self::start_engine(&settings, &languages).await?;
        info!(languages = %languages.join("+"), "Tesseract model loaded");

        Ok(Self {
            engine,
            languages,
            psm: settings.psm,
            oem: settings.oem,
        })
    }

    #[cfg(not(feature = "leptess"))]
    async fn start_engine(settings: &TesseractSettings, languages: &[String]) -> Result<Engine> {
        let installed = list_installed_languages(settings).await?;
        let missing: Vec<&String> = languages
            .iter()
            .filter(|lang| !installed.contains(lang))
            .collect();
        if !missing.is_empty() {
            return Err(OcrGateError::ModelLoad(format!(
                "Tesseract language data not installed: {}",
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(Engine::Cli {
            binary: settings.binary.clone(),
            tessdata_dir: settings.tessdata_dir.clone(),
        })
    }

    #[cfg(feature = "leptess")]
    async fn start_engine(settings: &TesseractSettings, languages: &[String]) -> Result<Engine> {
        let data_path = settings
            .tessdata_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let lang = languages.join("+");
        let psm = settings.psm.to_string();

        let tesseract = tokio::task::spawn_blocking(move || {
            let mut lt = leptess::LepTess::new(data_path.as_deref(), &lang)
                .map_err(|e| OcrGateError::ModelLoad(format!("Tesseract init failed: {e}")))?;
            lt.set_variable(leptess::Variable::TesseditPagesegMode, &psm)
                .map_err(|e| OcrGateError::ModelLoad(format!("Invalid page segmentation mode: {e}")))?;
            Ok::<_, OcrGateError>(lt)
        })
        .await
        .map_err(|e| OcrGateError::ModelLoad(format!("Tesseract init task panicked: {e}")))??;

        Ok(Engine::InProcess {
            tesseract: std::sync::Arc::new(tokio::sync::Mutex::new(tesseract)),
        })
    }
}

#[async_trait]
impl OcrModel for TesseractModel {
    fn backend(&self) -> BackendName {
        BackendName::EasyOcr
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    async fn process(&self, image_path: &Path) -> Result<Recognition> {
        match &self.engine {
            Engine::Cli {
                binary,
                tessdata_dir,
            } => {
                let mut command = Command::new(binary);
                command
                    .arg(image_path)
                    .arg("stdout")
                    .arg("-l")
                    .arg(self.languages.join("+"))
                    .arg("--psm")
                    .arg(self.psm.to_string())
                    .arg("--oem")
                    .arg(self.oem.to_string());
                if let Some(dir) = tessdata_dir {
                    command.arg("--tessdata-dir").arg(dir);
                }
                command.arg("tsv");

                debug!(image = %image_path.display(), "Running tesseract");
                let output = command
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| OcrGateError::Processing(format!("Failed to run tesseract: {e}")))?;

                if !output.status.success() {
                    return Err(OcrGateError::Processing(format!(
                        "Tesseract failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }

                Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
            }
            #[cfg(feature = "leptess")]
            Engine::InProcess { tesseract } => {
                let tesseract = std::sync::Arc::clone(tesseract);
                let path = image_path.to_path_buf();

                let (text, confidence) = tokio::task::spawn_blocking(move || {
                    let mut lt = tesseract.blocking_lock();
                    lt.set_image(&path)
                        .map_err(|e| OcrGateError::Processing(format!("Failed to set image: {e}")))?;
                    let text = lt.get_utf8_text().map_err(|e| {
                        OcrGateError::Processing(format!("Failed to extract text: {e}"))
                    })?;
                    Ok::<_, OcrGateError>((text, lt.mean_text_conf()))
                })
                .await
                .map_err(|e| OcrGateError::Processing(format!("OCR task panicked: {e}")))??;

                let confidence = Some(confidence as f32 / 100.0);
                let regions = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| TextRegion {
                        text: line.to_string(),
                        confidence,
                        bbox: None,
                    })
                    .collect();

                Ok(Recognition {
                    text: text.trim().to_string(),
                    regions,
                })
            }
        }
    }
}

#[cfg(not(feature = "leptess"))]
async fn list_installed_languages(settings: &TesseractSettings) -> Result<Vec<String>> {
    let mut command = Command::new(&settings.binary);
    if let Some(dir) = &settings.tessdata_dir {
        command.arg("--tessdata-dir").arg(dir);
    }
    let output = command
        .arg("--list-langs")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            OcrGateError::ModelLoad(format!(
                "Tesseract binary '{}' is not available: {e}",
                settings.binary
            ))
        })?;

    if !output.status.success() {
        return Err(OcrGateError::ModelLoad(format!(
            "tesseract --list-langs failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    // Older releases print the list on stderr.
    let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
    listing.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(parse_language_listing(&listing))
}

pub(crate) fn parse_language_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

struct LineAccumulator {
    id: (u32, u32, u32, u32),
    words: Vec<String>,
    confidences: Vec<f32>,
    bbox: BoundingBox,
}

impl LineAccumulator {
    fn finish(self) -> TextRegion {
        let confidence = if self.confidences.is_empty() {
            None
        } else {
            Some(self.confidences.iter().sum::<f32>() / self.confidences.len() as f32 / 100.0)
        };
        TextRegion {
            text: self.words.join(" "),
            confidence,
            bbox: Some(self.bbox),
        }
    }
}

/// Turns Tesseract TSV output into one region per text line.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. Only word rows (level 5) carry text.
pub(crate) fn parse_tsv(tsv: &str) -> Recognition {
    let mut regions = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let num = |i: usize| cols[i].trim().parse::<i64>().unwrap_or(0);
        let id = (
            num(1) as u32,
            num(2) as u32,
            num(3) as u32,
            num(4) as u32,
        );
        let bbox = BoundingBox {
            x: num(6),
            y: num(7),
            width: num(8),
            height: num(9),
        };
        let conf = cols[10].trim().parse::<f32>().ok().filter(|c| *c >= 0.0);

        match current.as_mut() {
            Some(line) if line.id == id => {
                line.words.push(word.to_string());
                line.confidences.extend(conf);
                line.bbox = line.bbox.union(&bbox);
            }
            _ => {
                if let Some(done) = current.take() {
                    regions.push(done.finish());
                }
                current = Some(LineAccumulator {
                    id,
                    words: vec![word.to_string()],
                    confidences: conf.into_iter().collect(),
                    bbox,
                });
            }
        }
    }
    if let Some(done) = current {
        regions.push(done.finish());
    }

    let text = regions
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Recognition { text, regions }
}
