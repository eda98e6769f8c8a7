//! Request handlers.
//!
//! Each handler holds the engine lock only for the single call it needs.
//! Password hashing runs on the blocking pool between two short locks.

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::extract::{AuthUser, JsonBody, QueryParams, todo_id};
use super::types::{
    DeleteResponse, HealthResponse, ListParams, LoginRequest, MessageResponse, RefreshRequest,
    RootResponse, TodoResponse, TokenResponse, UserResponse, VERSION,
};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tasknest_core::{
    NestError, NewTodo, Page, Registration, TodoFilter, TodoPatch, TokenError, peek_expiry,
};
use tracing::{error, info, warn};

// =============================================================================
// SERVICE
// =============================================================================

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".into(),
        version: VERSION.into(),
        message: "TaskNest API is running".into(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: "tasknest".into(),
        version: VERSION.into(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Resource not found")
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Run CPU-bound work off the async workers.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        error!(error = %err, "blocking task failed");
        ApiError::internal()
    })
}

// =============================================================================
// AUTH
// =============================================================================

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(registration): JsonBody<Registration>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let pending = state.nest.lock().await.begin_signup(registration)?;
    let signup = blocking(move || pending.hash()).await?;
    let pair = state.nest.lock().await.finish_signup(signup)?;
    info!(user_id = %pair.user.id, "user registered");
    Ok((StatusCode::CREATED, Json(pair.into())))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let attempt = state.nest.lock().await.begin_login(&body.email)?;
    let verified = blocking(move || attempt.verify(&body.password)).await?;
    let result = match verified {
        Ok(verified) => state.nest.lock().await.finish_login(verified),
        Err(err) => Err(err),
    };
    match result {
        Ok(pair) => {
            info!(user_id = %pair.user.id, "user logged in");
            Ok(Json(pair.into()))
        }
        Err(err) => {
            info!("login rejected");
            Err(err.into())
        }
    }
}

pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let result = state.nest.lock().await.refresh(&body.refresh_token);
    match result {
        Ok(pair) => Ok(Json(pair.into())),
        Err(err @ NestError::Token(TokenError::Reused)) => {
            warn!(
                exp = peek_expiry(&body.refresh_token).ok(),
                "revoked refresh token presented again; all sessions of its owner revoked"
            );
            Err(err.into())
        }
        Err(err @ NestError::Token(TokenError::Revoked)) => {
            info!("refresh token has no session");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.nest.lock().await.logout(&body.refresh_token)?;
    Ok(Json(MessageResponse {
        message: "Successfully logged out".into(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Json<UserResponse>> {
    let user = state.nest.lock().await.current_user(&ctx)?;
    Ok(Json(user.into()))
}

// =============================================================================
// TODOS
// =============================================================================

pub async fn create_todo(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    JsonBody(input): JsonBody<NewTodo>,
) -> ApiResult<(StatusCode, Json<TodoResponse>)> {
    let todo = state.nest.lock().await.create_todo(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(todo.into())))
}

pub async fn list_todos(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    QueryParams(params): QueryParams<ListParams>,
) -> ApiResult<Json<Page<TodoResponse>>> {
    let filter = TodoFilter::from(params);
    let page = state.nest.lock().await.list_todos(&ctx, &filter)?;
    Ok(Json(page.map(TodoResponse::from)))
}

pub async fn get_todo(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TodoResponse>> {
    let id = todo_id(&id)?;
    let todo = state.nest.lock().await.get_todo(&ctx, id)?;
    Ok(Json(todo.into()))
}

pub async fn update_todo(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<TodoPatch>,
) -> ApiResult<Json<TodoResponse>> {
    let id = todo_id(&id)?;
    let todo = state.nest.lock().await.update_todo(&ctx, id, patch)?;
    Ok(Json(todo.into()))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = todo_id(&id)?;
    let id = state.nest.lock().await.delete_todo(&ctx, id)?;
    Ok(Json(DeleteResponse {
        message: "Todo deleted successfully".into(),
        id,
    }))
}

pub async fn complete_todo(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<TodoResponse>> {
    let id = todo_id(&id)?;
    let todo = state.nest.lock().await.complete_todo(&ctx, id)?;
    Ok(Json(todo.into()))
}
