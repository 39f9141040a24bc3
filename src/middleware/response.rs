use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// JSON body keyed by resource name, e.g. `{"movie": {...}}`.
#[derive(Debug)]
pub struct Envelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Result<Map<String, Value>, serde_json::Error>,
}

impl Envelope {
    pub fn new(key: &str, value: impl Serialize) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Ok(Map::new()),
        }
        .and(key, value)
    }

    /// Add another top-level member.
    pub fn and(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(body) = &mut self.body {
            match serde_json::to_value(value) {
                Ok(value) => {
                    body.insert(key.to_string(), value);
                }
                Err(e) => self.body = Err(e),
            }
        }
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn created(self) -> Self {
        self.with_status(StatusCode::CREATED)
    }

    pub fn accepted(self) -> Self {
        self.with_status(StatusCode::ACCEPTED)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        match self.body {
            Ok(body) => (self.status, self.headers, Json(Value::Object(body))).into_response(),
            Err(e) => ApiError::server_error(format!("failed to serialize response: {e}"))
                .into_response(),
        }
    }
}

pub type ApiResult = Result<Envelope, ApiError>;
