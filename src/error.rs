use std::collections::BTreeMap;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Rejections vs faults
///
/// Admission and authentication rejections are expected, high-frequency
/// outcomes and are never logged at error level. Store faults and invariant
/// violations are unexpected and get logged with full context before the
/// sanitized response is produced.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("one or more fields failed validation")]
    Validation(BTreeMap<String, String>),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("no principal attached to the request")]
    MissingPrincipal,

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            // Surfaced through a field error where the email came from input;
            // reaching here means a handler forgot to map it.
            StoreError::DuplicateEmail => AppError::Store(err.to_string()),
            StoreError::Unavailable(msg) => AppError::Store(msg),
        }
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, String>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "failed_validation"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::MethodNotAllowed(_) => {
                (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::EditConflict => (StatusCode::CONFLICT, "edit_conflict"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::InvalidAuthenticationToken => {
                (StatusCode::UNAUTHORIZED, "invalid_authentication_token")
            }
            AppError::AuthenticationRequired => {
                (StatusCode::UNAUTHORIZED, "authentication_required")
            }
            AppError::InactiveAccount => (StatusCode::FORBIDDEN, "inactive_account"),
            AppError::NotPermitted => (StatusCode::FORBIDDEN, "not_permitted"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            AppError::MissingPrincipal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        // Log the full error server-side; the client only sees the sanitized
        // message below. A missing principal is a wiring bug in the middleware
        // stack and is logged apart from ordinary store faults.
        match &self {
            AppError::MissingPrincipal => {
                tracing::error!(error = %self, "request reached a gate without a resolved principal");
            }
            AppError::Store(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
            }
            AppError::RateLimited => {}
            _ => {
                tracing::debug!(error = %self, "request rejected");
            }
        }

        let (message, fields) = match self {
            AppError::Validation(fields) => (
                "one or more fields failed validation".to_string(),
                Some(fields),
            ),
            // Never leak internals for server-side faults.
            AppError::MissingPrincipal | AppError::Store(_) | AppError::Internal(_) => (
                "the server encountered a problem and could not process your request".to_string(),
                None,
            ),
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            fields,
        };

        let mut response = (status, axum::Json(body)).into_response();

        // Tells clients which authentication scheme is expected.
        if matches!(status, StatusCode::UNAUTHORIZED) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
