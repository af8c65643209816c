use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Unified error type for the orchestrator. Every fallible operation in the
/// crate returns `Result<T, Error>`; the ingress API maps variants to HTTP
/// statuses, workers map them to `Scan.error_message`, and the queue maps
/// transport failures to its retry policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unsupported scanner: {0}")]
    UnsupportedScanner(String),

    #[error("invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("scan not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("illegal state transition: {0}")]
    IllegalTransition(String),

    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("scan store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("scanner execution failed: {0}")]
    ScannerExecutionFailed(String),

    #[error("scanner timed out after {0:?}")]
    ScannerTimeout(std::time::Duration),

    #[error("failed to parse scanner output: {0}")]
    ScannerParseFailed(String),
}

impl Error {
    /// Whether this error represents a transient condition the caller should
    /// retry, as opposed to a terminal condition that should be recorded and
    /// not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::QueueUnavailable(_) | Error::StoreUnavailable(_))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidTarget(_) | Error::UnsupportedScanner(_) | Error::InvalidOptions(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::QueueUnavailable(_) | Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::IllegalTransition(_)
            | Error::ScannerExecutionFailed(_)
            | Error::ScannerTimeout(_)
            | Error::ScannerParseFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "unhandled error reached ingress");
        }

        let body = ErrorBody {
            error: error_kind(&self).to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::InvalidTarget(_) => "invalid_target",
        Error::UnsupportedScanner(_) => "unsupported_scanner",
        Error::InvalidOptions(_) => "invalid_options",
        Error::NotFound(_) => "not_found",
        Error::IllegalTransition(_) => "illegal_transition",
        Error::QueueUnavailable(_) => "queue_unavailable",
        Error::StoreUnavailable(_) => "store_unavailable",
        Error::ScannerExecutionFailed(_) => "scanner_execution_failed",
        Error::ScannerTimeout(_) => "scanner_timeout",
        Error::ScannerParseFailed(_) => "scanner_parse_error",
    }
}
