//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stockpile_engine::ErrorCategory;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] stockpile_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A batch resolution is already running")]
    BatchInProgress,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) => match e.category() {
                ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCategory::AlreadyResolved => StatusCode::CONFLICT,
                ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                ErrorCategory::Persistence => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCategory::Detection => StatusCode::BAD_GATEWAY,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BatchInProgress => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, category, details) = match &self {
            AppError::Engine(e) => {
                if e.is_retryable() {
                    tracing::warn!("Engine error: {:?}", e);
                } else {
                    tracing::debug!("Engine error: {:?}", e);
                }
                let details = e.is_retryable().then(|| "retry the request".to_string());
                (e.to_string(), Some(e.category()), details)
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) => (msg.clone(), None, None),
            AppError::BatchInProgress => (self.to_string(), None, None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            category,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use stockpile_engine::{Error, RepositoryError};
    use uuid::Uuid;

    #[test]
    fn status_codes_follow_error_category() {
        let cases = [
            (
                AppError::from(Error::NonExhaustiveCustomResolution { missing: vec![] }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(Error::AlreadyResolved(Uuid::nil())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(Error::ConflictNotFound(Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(Error::Persistence(RepositoryError::Unavailable("down".into()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(Error::Detection("timeout".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::BadRequest("nope".into()), StatusCode::BAD_REQUEST),
            (AppError::BatchInProgress, StatusCode::CONFLICT),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
