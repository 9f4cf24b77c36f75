use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Every way a request can fail, each mapped to one status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Fetching or decoding the input image failed.
    #[error("Failed to load image: {0:#}")]
    LoadImage(anyhow::Error),
    /// Captioning or embedding failed.
    #[error("Processing error: {0:#}")]
    Processing(anyhow::Error),
    /// The multipart body lacks the expected field.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    /// The multipart body could not be read, keeps the parser's status.
    #[error("Invalid upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::LoadImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[test]
fn test_status_codes() {
    let err = ApiError::LoadImage(anyhow::anyhow!("connection refused"));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "Failed to load image: connection refused");

    let err = ApiError::Processing(anyhow::anyhow!("out of memory").context("caption failed"));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        err.to_string(),
        "Processing error: caption failed: out of memory"
    );

    let err = ApiError::InvalidUpload("missing field `file`".into());
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}
