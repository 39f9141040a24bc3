// handlers/mod.rs - endpoint handlers and the shared JSON body extractor

pub mod debug;
pub mod healthcheck;
pub mod movies;
pub mod tokens;
pub mod users;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::error::ApiError;

pub const MAX_BODY_BYTES: usize = 1_048_576;

/// JSON request body whose rejections are reported as `400 {"error": "..."}`.
/// Targets use `deny_unknown_fields`, so stray keys are rejected too.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::BadRequest(format!("body must not be larger than {MAX_BODY_BYTES} bytes"))
            } else {
                ApiError::BadRequest(rejection.body_text())
            }
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::BadRequest("body must not be empty".to_string()));
        }

        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| ApiError::BadRequest(describe_json_error(&e)))
    }
}

fn describe_json_error(err: &serde_json::Error) -> String {
    let message = err.to_string();
    match err.classify() {
        Category::Syntax if message.starts_with("trailing characters") => {
            "body must only contain a single JSON value".to_string()
        }
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            err.line(),
            err.column()
        ),
        Category::Eof => "body contains badly-formed JSON".to_string(),
        Category::Data => match unknown_field(&message) {
            Some(field) => format!("body contains unknown key \"{field}\""),
            None => format!("body contains invalid JSON value: {message}"),
        },
        Category::Io => message,
    }
}

/// Pulls `foo` out of serde's "unknown field `foo`, expected ..." message.
fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
