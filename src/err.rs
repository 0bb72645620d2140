//! Error types shared by the query services.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use tracing::error;

/// Error kind returned by the query services.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// A request value failed validation.
    #[error("{0}")]
    InvalidArgument(String),
    /// A referenced entity does not exist.
    #[error("not found")]
    NotFound,
    /// The stored schema version is outside the compatibility set. Fatal at
    /// startup; never produced by a running service.
    #[error("{0}")]
    SchemaVersionMismatch(String),
    /// Unexpected failure; details are logged, never sent to clients.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Shorthand for building an `InvalidArgument` error.
    pub fn invalid<S: Into<String>>(reason: S) -> Self {
        ServiceError::InvalidArgument(reason.into())
    }
}

impl From<rocksdb::Error> for ServiceError {
    fn from(err: rocksdb::Error) -> Self {
        ServiceError::Internal(err.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(err.into())
    }
}

/// Error body sent to clients.
#[derive(serde::Serialize, Debug)]
pub struct ErrorBody {
    /// Always `"failed"`.
    pub status: &'static str,
    /// Human-readable reason; opaque for internal errors.
    pub reason: String,
}

impl actix_web::ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::SchemaVersionMismatch(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let reason = match self {
            ServiceError::InvalidArgument(reason) => reason.clone(),
            ServiceError::NotFound => "not found".to_string(),
            // Full context goes to the log; the client gets an opaque reason.
            ServiceError::SchemaVersionMismatch(_) | ServiceError::Internal(_) => {
                error!("internal error: {:?}", self);
                "internal server error".to_string()
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            status: "failed",
            reason,
        })
    }
}
