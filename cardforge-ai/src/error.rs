//! Error types for cardforge-ai
//!
//! `GenerationError` is the taxonomy shared by the generation client, the
//! retry helper, the realtime session and the exporter. `ApiError` maps
//! failures onto HTTP responses for the service surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a generation, realtime or export operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Transport-level failure (connect, TLS, socket closed)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status with the server's message
    #[error("Remote service error {status_code}: {message}")]
    RemoteService { status_code: u16, message: String },

    /// Success status but the payload has an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No terminal event within the configured bound
    #[error("Timed out after {0} ms")]
    TimedOut(u64),

    /// Cooperative cancellation
    #[error("Cancelled")]
    Cancelled,

    /// Realtime session completed without any audio
    #[error("Realtime session completed without audio")]
    NoAudioReceived,

    /// Server-reported realtime error event
    #[error("Realtime session failed: {0}")]
    SessionFailed(String),

    /// Writing the deck file or copying media failed
    #[error("Export error: {0}")]
    Export(String),

    /// Local file I/O failure (media write)
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GenerationError {
    fn from(err: std::io::Error) -> Self {
        GenerationError::Io(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GenerationError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GenerationError::Network(err.to_string())
    }
}

/// Result type for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., run id already building
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream generation failure (502)
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// cardforge-common error
    #[error("Common error: {0}")]
    Common(#[from] cardforge_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Generation(ref err) => {
                let status = match err {
                    GenerationError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, "GENERATION_ERROR", err.to_string())
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
