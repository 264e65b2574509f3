//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced at the HTTP boundary. Expected conditions with their own
/// status codes (already-archived urls) are handled in the handlers; these
/// are the failure paths.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("url is neither an image nor a recognized gallery page")]
    NotAnImage,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] imagehoard_core::Error),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnreachable(_) | Self::UpstreamStatus(_) => StatusCode::NOT_FOUND,
            Self::NotAnImage => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
