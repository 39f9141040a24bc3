// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

use crate::auth::password::PasswordError;
use crate::auth::token::TokenError;
use crate::database::StoreError;

/// Generic message for every 500; the detail only goes to the log.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    InvalidCredentials,
    InvalidAuthenticationToken,
    AuthenticationRequired,

    // 403 Forbidden
    InactiveAccount,
    NotPermitted,

    // 404 Not Found
    NotFound,

    // 409 Conflict
    EditConflict,

    // 422 Unprocessable Entity
    FailedValidation(HashMap<String, String>),

    // 429 Too Many Requests
    RateLimitExceeded,

    // 500 Internal Server Error, carries the detail that is logged but never returned
    Internal(String),
}

impl ApiError {
    pub fn server_error(err: impl fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn failed_validation(errors: HashMap<String, String>) -> Self {
        ApiError::FailedValidation(errors)
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidCredentials => "invalid authentication credentials",
            ApiError::InvalidAuthenticationToken => "invalid or missing authentication token",
            ApiError::AuthenticationRequired => "you must be authenticated to access this resource",
            ApiError::InactiveAccount => {
                "your user account must be activated to access this resource"
            }
            ApiError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
            }
            ApiError::NotFound => "the requested resource could not be found",
            ApiError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again"
            }
            ApiError::FailedValidation(_) => "failed validation",
            ApiError::RateLimitExceeded => "rate limit exceeded",
            ApiError::Internal(_) => SERVER_ERROR_MESSAGE,
        }
    }

    /// Convert to JSON response body: a single `error` field
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            _ => json!({ "error": self.message() }),
        }
    }

    /// Token failures tell the client how to re-authenticate
    fn challenges(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidAuthenticationToken | ApiError::AuthenticationRequired
        )
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => ApiError::EditConflict,
            StoreError::DuplicateEmail => {
                let mut errors = HashMap::new();
                errors.insert(
                    "email".to_string(),
                    "a user with this email address already exists".to_string(),
                );
                ApiError::FailedValidation(errors)
            }
            // Slow or failing backends are server errors, never "not found"
            StoreError::Timeout(_) | StoreError::Token(_) | StoreError::Database(_) => {
                ApiError::server_error(err)
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::server_error(err)
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::server_error(err)
    }
}

// Standard error trait implementations
impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Internal(detail) => write!(f, "{}", detail),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            // Runs inside the request span, which carries method and URL
            tracing::error!(error = %detail, "server error");
        }

        let status = self.status_code();
        let mut response = (status, Json(self.to_json())).into_response();
        if self.challenges() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
