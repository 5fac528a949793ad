//! ocrgate: an authenticated HTTP front end for pluggable OCR backends.
//!
//! `POST /ocr` stores the uploaded image, resolves a cached model for the
//! requested backend and extra languages, runs recognition and returns the
//! structured result as JSON.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ocr;
pub mod storage;
