use std::env;
use std::path::PathBuf;

use crate::ocr::BackendName;

pub fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a whole `/ocr` request body.
    pub max_upload_bytes: usize,
    /// `text` (default) or `json`.
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    /// When false every request is let through. Only meant for local use.
    pub enforce: bool,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Path pattern for backend configuration files; `*` is replaced by the
    /// backend name.
    pub configs_path: String,
    pub default_backend: BackendName,
    /// Where uploads and result sidecars are written.
    pub output_dir: PathBuf,
    pub load_timeout_secs: u64,
    pub process_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("OCR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("OCR_PORT", 8000),
                max_upload_bytes: parse_env_or("OCR_MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
                log_format: env::var("OCR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
            auth: AuthConfig {
                credentials_path: env::var("OCR_CREDENTIALS_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("credentials.json")),
                enforce: parse_env_or("OCR_AUTH_ENFORCE", true),
            },
            ocr: OcrConfig {
                configs_path: env::var("OCR_CONFIGS_PATH")
                    .unwrap_or_else(|_| "configs/*.json".to_string()),
                default_backend: parse_env_or("OCR_DEFAULT_BACKEND", BackendName::EasyOcr),
                output_dir: env::var("OCR_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("images/server/output")),
                load_timeout_secs: parse_env_or("OCR_LOAD_TIMEOUT", 300),
                process_timeout_secs: parse_env_or("OCR_PROCESS_TIMEOUT", 120),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
