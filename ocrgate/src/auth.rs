//! Single shared credential check for the OCR routes.
//!
//! The configured username and password are never compared directly.
//! Both sides are hashed to fixed-length SHA-256 digests first, and the
//! digests are compared without early exit, so response timing reveals
//! neither matching prefixes nor lengths.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{OcrGateError, Result};

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Load `{"username": ..., "password": ...}` from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OcrGateError::Configuration(format!(
                "Cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            OcrGateError::Configuration(format!(
                "Malformed credentials file {}: {e}",
                path.display()
            ))
        })
    }
}

type Fingerprint = [u8; 32];

fn fingerprint(value: &str) -> Fingerprint {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

fn constant_time_eq(a: &Fingerprint, b: &Fingerprint) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Clone)]
pub struct AuthGate {
    username: Fingerprint,
    password: Fingerprint,
    enforce: bool,
}

impl AuthGate {
    pub fn new(credentials: &Credentials, enforce: bool) -> Self {
        Self {
            username: fingerprint(&credentials.username),
            password: fingerprint(&credentials.password),
            enforce,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.enforce
    }

    /// Both fields must match. Each is checked independently and the
    /// results are combined without short-circuiting.
    pub fn check(&self, username: &str, password: &str) -> bool {
        if !self.enforce {
            return true;
        }
        let username_ok = constant_time_eq(&fingerprint(username), &self.username);
        let password_ok = constant_time_eq(&fingerprint(password), &self.password);
        username_ok & password_ok
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("enforce", &self.enforce)
            .finish_non_exhaustive()
    }
}
