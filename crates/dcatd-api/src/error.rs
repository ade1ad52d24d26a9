//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use dcatd_core::{logging, Error};

/// Error returned by handlers; rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PreconditionFailed(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::PreconditionFailed(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) | Error::InvalidFilter(msg) => ApiError::BadRequest(msg),
            Error::Serialization(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::PreconditionFailed(msg) | Error::AlreadyExists(msg) => {
                ApiError::PreconditionFailed(msg)
            }
            Error::Timeout(msg) | Error::Backend(msg) => ApiError::ServiceUnavailable(msg),
            Error::Database(e) => ApiError::ServiceUnavailable(format!("Database error: {}", e)),
            Error::Config(msg) | Error::Internal(msg) => ApiError::Internal(msg),
            Error::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                subsystem = logging::SUBSYSTEM_API,
                status = status.as_u16(),
                error = self.message(),
                "Request failed"
            );
        } else {
            debug!(
                subsystem = logging::SUBSYSTEM_API,
                status = status.as_u16(),
                error = self.message(),
                "Request rejected"
            );
        }

        let body = Json(serde_json::json!({
            "error": self.message(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
