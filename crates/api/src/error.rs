//! API Error Types

use crate::rate_limit::limited_headers;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fallback::FallbackError;
use mock_engine::MockError;
use serde_json::json;
use std::time::Duration;
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to HTTP clients as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing x-owner-id header")]
    MissingOwner,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("rate limit exceeded")]
    RateLimited { limit: u32, retry_after: Duration },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("mock endpoint template is invalid")]
    InvalidTemplate,

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingOwner | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidTemplate | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("Internal error: {}", detail);
        }
        let body = Json(json!({ "error": self.to_string() }));
        let mut response = (self.status(), body).into_response();
        if let ApiError::RateLimited { limit, retry_after } = &self {
            response
                .headers_mut()
                .extend(limited_headers(*limit, *retry_after));
        }
        response
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ApiError::NotFound,
            StorageError::Forbidden => ApiError::Forbidden,
            StorageError::Invalid(msg) => ApiError::BadRequest(msg),
            StorageError::DatabaseError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<MockError> for ApiError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::DefinitionNotFound => ApiError::NotFound,
            MockError::MethodNotAllowed { .. } => ApiError::MethodNotAllowed,
            MockError::Unauthorized => ApiError::Unauthorized,
            MockError::RateLimited { limit, retry_after } => {
                ApiError::RateLimited { limit, retry_after }
            }
            MockError::TemplateMalformed(_) => ApiError::InvalidTemplate,
            MockError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<FallbackError> for ApiError {
    fn from(err: FallbackError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}
