//! Error envelope returned by every failing request.
//!
//! ```json
//! { "code": "NOT_FOUND", "message": "...", "details": [{ "field": null, "message": "..." }] }
//! ```

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tasknest_core::{FieldError, NestError, TokenError};

const INTERNAL_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    InvalidToken,
    TokenExpired,
    NotFound,
    MethodNotAllowed,
    AlreadyExists,
    RateLimited,
    InternalServerError,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error ready to be rendered as a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Vec<FieldError>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// 422 with a single detail entry.
    pub fn validation(field: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: ErrorCode::ValidationError,
            message: "Request validation failed".into(),
            details: vec![FieldError {
                field: field.map(String::from),
                message,
            }],
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(
            ErrorCode::RateLimited,
            "Too many requests. Please slow down and try again shortly.",
        )
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalServerError, INTERNAL_MESSAGE)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            ErrorCode::MethodNotAllowed,
            "Method not allowed for this resource",
        )
    }
}

impl From<NestError> for ApiError {
    fn from(err: NestError) -> Self {
        match err {
            NestError::Validation(details) => Self {
                code: ErrorCode::ValidationError,
                message: "Request validation failed".into(),
                details,
            },
            NestError::NotFound(message) => Self::new(ErrorCode::NotFound, message),
            NestError::Conflict(message) => Self::new(ErrorCode::AlreadyExists, message),
            NestError::Unauthorized(message) => Self::unauthorized(message),
            NestError::Token(TokenError::Expired) => {
                Self::new(ErrorCode::TokenExpired, "Token has expired")
            }
            NestError::Token(TokenError::Encoding(reason)) => {
                tracing::error!(%reason, "token encoding failed");
                Self::internal()
            }
            NestError::Token(other) => {
                Self::new(ErrorCode::InvalidToken, format!("Invalid token: {}", other))
            }
            NestError::Storage(_) | NestError::Encoding(_) => {
                tracing::error!(error = %err, "internal error");
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let mut response = (status, Json(&self)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
