//! HTTP error mapping.

use axum::{
    extract::rejection::QueryRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use protocol::messages::{ErrorCode, ErrorMessage};
use serde_json::json;
use thiserror::Error;

use crate::files::FileError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No identity header (or query parameter, for streams).
    #[error("Missing or empty user identity")]
    Unauthorized,

    /// Malformed query string.
    #[error("Invalid query: {0}")]
    BadRequest(String),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Status and wire payload for a file error.
pub fn file_error_response(err: &FileError) -> (StatusCode, ErrorMessage) {
    let (status, code) = match err {
        FileError::OutOfBoundsPath(_) => (StatusCode::BAD_REQUEST, ErrorCode::OutOfBoundsPath),
        FileError::AccessDenied(_) => (StatusCode::FORBIDDEN, ErrorCode::AccessDenied),
        FileError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
        FileError::NotADirectory(_) => (StatusCode::BAD_REQUEST, ErrorCode::NotADirectory),
        FileError::NotAFile(_) => (StatusCode::BAD_REQUEST, ErrorCode::NotAFile),
        FileError::InvalidRange(_) => (StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest),
        FileError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::TooLarge),
        FileError::PermissionDenied(_) => (StatusCode::FORBIDDEN, ErrorCode::PermissionDenied),
        FileError::Truncated { .. } | FileError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::IoError)
        }
    };

    let message = match err {
        FileError::Io(e) => {
            tracing::error!("I/O error: {}", e);
            "I/O error while reading file".to_string()
        }
        FileError::Truncated { .. } => "File was truncated while being followed".to_string(),
        other => other.to_string(),
    };

    (status, ErrorMessage::new(code, message))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorMessage::new(ErrorCode::Unauthorized, self.to_string()),
            ),
            ApiError::BadRequest(_) => (
                StatusCode::BAD_REQUEST,
                ErrorMessage::new(ErrorCode::InvalidRequest, self.to_string()),
            ),
            ApiError::File(err) => file_error_response(err),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorMessage::new(ErrorCode::InternalError, "Internal server error"),
                )
            }
        };

        let body = Json(json!({ "error": message }));

        if matches!(self, ApiError::Unauthorized) {
            return (status, [(header::WWW_AUTHENTICATE, "UserHeader")], body).into_response();
        }
        (status, body).into_response()
    }
}
