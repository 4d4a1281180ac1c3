use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy surfaced to clients (spec §7). Kinds that the pipeline
/// resolves onto a task record rather than raising (`Duplicate`,
/// `ExtractionFailed`) are still represented here so internal call sites
/// have one error type to propagate with `?`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate image for tenant")]
    Duplicate,

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Duplicate => StatusCode::OK,
            Error::ExtractionFailed(_) => StatusCode::OK,
            Error::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Jwt(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "unhandled internal error");
        }
        let body = ErrorResponse {
            error: error_kind(&self),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Database(_) => "database_error",
        Error::Serialization(_) => "serialization_error",
        Error::BadRequest(_) => "bad_request",
        Error::Unauthorized => "unauthorized",
        Error::Forbidden(_) => "forbidden",
        Error::NotFound(_) => "not_found",
        Error::Duplicate => "duplicate",
        Error::ExtractionFailed(_) => "extraction_failed",
        Error::UpstreamTimeout(_) => "upstream_timeout",
        Error::Jwt(_) => "unauthorized",
        Error::ObjectStore(_) => "internal_error",
        Error::Internal(_) => "internal_error",
    }
}

/// Convenience trait mirroring the teacher's `ErrorExt`, letting services
/// attach context without an intermediate `map_err` closure at every call
/// site.
pub trait ErrorExt<T> {
    fn internal(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ErrorExt<T> for std::result::Result<T, E> {
    fn internal(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Internal(format!("{context}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = Error::NotFound("task".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_is_not_an_http_error() {
        assert_eq!(Error::Duplicate.status_code(), StatusCode::OK);
    }
}