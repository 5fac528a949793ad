use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::state::AppState;
use crate::ocr::BackendName;

#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub default_backend: BackendName,
    pub auth_enforced: bool,
    pub loaded_models: Vec<String>,
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_backend: state.config.ocr.default_backend,
        auth_enforced: state.auth.is_enforcing(),
        loaded_models: state.models.loaded_keys(),
    })
}
