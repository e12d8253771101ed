use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use picstyle_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses.
///
/// The anti-probing fold (`NotOwned` -> `NotFound`) is applied by the
/// lifecycle layer before errors reach this type, so the mapping here
/// is static.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `picstyle-core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
                CoreError::NotOwned { .. } => {
                    (StatusCode::FORBIDDEN, "NOT_OWNED", core.to_string())
                }
                CoreError::Busy => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BUSY",
                    core.to_string(),
                ),
                CoreError::TimedOut => {
                    (StatusCode::REQUEST_TIMEOUT, "TIMED_OUT", core.to_string())
                }
                CoreError::WorkerFailed(_) | CoreError::WorkerTimeout { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "WORKER_FAILED",
                    core.to_string(),
                ),
                CoreError::Infra(msg) => {
                    tracing::error!(error = %msg, "Infrastructure error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
