//! Extractors that reject with the error envelope instead of axum's
//! plain-text defaults.

use super::AppState;
use super::error::ApiError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use tasknest_core::{AuthContext, TodoId};

const MISSING_HEADER: &str = "Missing authorization header. Format: Authorization: Bearer <token>";
const BAD_SCHEME: &str = "Invalid authorization header. Format: Authorization: Bearer <token>";

// =============================================================================
// BEARER AUTH
// =============================================================================

/// The caller, authenticated from an `Authorization: Bearer` access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::unauthorized(MISSING_HEADER))?
            .to_str()
            .map_err(|_| ApiError::unauthorized(BAD_SCHEME))?;

        let token = bearer_token(header).ok_or_else(|| ApiError::unauthorized(BAD_SCHEME))?;
        let ctx = state.nest.lock().await.authenticate(token)?;
        Ok(Self(ctx))
    }
}

/// The token part of a `Bearer <token>` header. The scheme is case-insensitive.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// =============================================================================
// BODY AND QUERY
// =============================================================================

/// JSON body whose rejections become `VALIDATION_ERROR`.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation(Some("body"), rejection.body_text())
}

/// Query string whose rejections become `VALIDATION_ERROR`.
#[derive(Debug, Clone)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::validation(Some("query"), rejection.body_text())
}

/// Parse a todo id from the path.
pub fn todo_id(raw: &str) -> Result<TodoId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(Some("id"), format!("'{}' is not a valid UUID", raw)))
}
