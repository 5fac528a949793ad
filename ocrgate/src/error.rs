use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Value sent with every 401 so browsers and clients prompt for credentials.
pub const BASIC_CHALLENGE: &str = "Basic realm=\"ocrgate\"";

#[derive(Error, Debug)]
pub enum OcrGateError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown OCR backend: {0}")]
    UnknownBackend(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl OcrGateError {
    pub fn status(&self) -> StatusCode {
        match self {
            OcrGateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OcrGateError::Validation(_) | OcrGateError::UnknownBackend(_) => {
                StatusCode::BAD_REQUEST
            }
            OcrGateError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            OcrGateError::Storage(_)
            | OcrGateError::Configuration(_)
            | OcrGateError::ModelLoad(_)
            | OcrGateError::Processing(_)
            | OcrGateError::Json(_)
            | OcrGateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OcrGateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            OcrGateError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for OcrGateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            OcrGateError::Unauthorized(msg)
            | OcrGateError::Validation(msg)
            | OcrGateError::PayloadTooLarge(msg)
            | OcrGateError::Configuration(msg)
            | OcrGateError::ModelLoad(msg)
            | OcrGateError::Processing(msg)
            | OcrGateError::Timeout(msg)
            | OcrGateError::Internal(msg) => msg.clone(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, OcrGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_carries_basic_challenge() {
        let response =
            OcrGateError::Unauthorized("Incorrect username or password".to_string())
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            BASIC_CHALLENGE
        );

        let json = body_json(response).await;
        assert_eq!(json["error"], "Incorrect username or password");
        assert_eq!(json["code"], 401);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_client_error() {
        let response = OcrGateError::UnknownBackend("paddle_ocr".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("paddle_ocr"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            OcrGateError::ModelLoad("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            OcrGateError::Timeout("x".into()).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            OcrGateError::PayloadTooLarge("x".into()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            OcrGateError::from(io).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
