//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use kasalog_workflow::{BrowseError, CaptureError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The action does not apply to the session's current state.
    Conflict(String),
    /// The store failed; nothing was changed.
    Store(String),
    Internal(String),
}

impl From<kasalog_core::Error> for ApiError {
    fn from(err: kasalog_core::Error) -> Self {
        use kasalog_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Database(e) => ApiError::Store(e.to_string()),
            Error::Store(msg) => ApiError::Store(msg),
            err @ (Error::Config(_) | Error::Request(_)) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BrowseError> for ApiError {
    fn from(err: BrowseError) -> Self {
        match err {
            BrowseError::Load(_) => ApiError::Store(err.to_string()),
            BrowseError::Delete(_) => ApiError::Store(err.to_string()),
            BrowseError::NotFound(_) => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::InvalidCoordinates(_) => ApiError::BadRequest(err.to_string()),
            CaptureError::MissingIdentifier | CaptureError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
