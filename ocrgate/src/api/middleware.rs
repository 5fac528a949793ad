//! # Basic Authentication Middleware
//!
//! Guards `/ocr` and `/ocr_test` with HTTP Basic credentials checked by the
//! [`AuthGate`](crate::auth::AuthGate). Runs before the handler reads the
//! body, so rejected requests never reach the upload directory.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};

use crate::api::state::AppState;
use crate::error::OcrGateError;

/// # Behavior
///
/// - Gate in open mode → request passes through unchecked.
/// - Missing or non-Basic `Authorization` header → 401.
/// - Wrong username or password → 401.
///
/// Every 401 carries `WWW-Authenticate: Basic`.
pub async fn basic_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.auth.is_enforcing() {
        tracing::debug!(uri = %request.uri(), "Auth gate open, skipping credential check");
        return next.run(request).await;
    }

    let Some(Authorization(basic)) = request.headers().typed_get::<Authorization<Basic>>() else {
        return OcrGateError::Unauthorized("Missing basic authentication credentials".to_string())
            .into_response();
    };

    if state.auth.check(basic.username(), basic.password()) {
        next.run(request).await
    } else {
        tracing::warn!(uri = %request.uri(), "Rejected request with incorrect credentials");
        OcrGateError::Unauthorized("Incorrect username or password".to_string()).into_response()
    }
}
