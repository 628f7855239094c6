//! API error types with HTTP response mapping.

use auth::AuthError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use domain::OrderError;
use store::{QueryError, StoreError};
use thiserror::Error;

const FORBIDDEN_MESSAGE: &str = "attempted action is not allowed";
const UNAUTHENTICATED_MESSAGE: &str = "authentication failed";
const INTERNAL_MESSAGE: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path, query or body.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transaction did not finish before the request deadline.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidArgument,
            ApiError::Order(err) => err.kind(),
            ApiError::Auth(err) => err.kind(),
            ApiError::Query(err) => err.kind(),
            ApiError::Store(err) => err.kind(),
            ApiError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InsufficientStock => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self.kind() {
            // Fixed messages: these must not reveal account or resource state.
            ErrorKind::PermissionDenied => FORBIDDEN_MESSAGE.to_string(),
            ErrorKind::Unauthenticated => UNAUTHENTICATED_MESSAGE.to_string(),
            ErrorKind::Internal => {
                tracing::error!(error = %self, "internal server error");
                INTERNAL_MESSAGE.to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
