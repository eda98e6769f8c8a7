//! # HTTP API
//!
//! axum router for the TaskNest REST API.
//!
//! | method | path                        | auth   |
//! |--------|-----------------------------|--------|
//! | GET    | `/`                         |        |
//! | GET    | `/health`                   |        |
//! | POST   | `/api/auth/signup`          |        |
//! | POST   | `/api/auth/login`           |        |
//! | POST   | `/api/auth/refresh`         |        |
//! | POST   | `/api/auth/logout`          |        |
//! | GET    | `/api/auth/me`              | bearer |
//! | POST   | `/api/todos`                | bearer |
//! | GET    | `/api/todos`                | bearer |
//! | GET    | `/api/todos/{id}`           | bearer |
//! | PUT    | `/api/todos/{id}`           | bearer |
//! | DELETE | `/api/todos/{id}`           | bearer |
//! | PATCH  | `/api/todos/{id}/complete`  | bearer |
//!
//! The four unauthenticated auth endpoints share one global rate limiter.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod types;

use crate::config::Settings;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use error::ApiError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tasknest_core::Nest;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// STATE
// =============================================================================

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub nest: Arc<Mutex<Nest>>,
    pub settings: Arc<Settings>,
    /// `None` when rate limiting is disabled.
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl AppState {
    pub fn new(nest: Nest, settings: Settings) -> Self {
        let limiter = NonZeroU32::new(settings.auth_rate_limit)
            .map(|per_minute| Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))));
        Self {
            nest: Arc::new(Mutex::new(nest)),
            settings: Arc::new(settings),
            limiter,
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/logout", post(handlers::logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(limited)
        .route("/api/auth/me", get(handlers::me))
        .route(
            "/api/todos",
            post(handlers::create_todo).get(handlers::list_todos),
        )
        .route(
            "/api/todos/{id}",
            get(handlers::get_todo)
                .put(handlers::update_todo)
                .delete(handlers::delete_todo),
        )
        .route("/api/todos/{id}/complete", patch(handlers::complete_todo))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS restricted to the configured origins, with credentials allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            tracing::warn!(path = %request.uri().path(), "auth rate limit exceeded");
            return ApiError::rate_limited().into_response();
        }
    }
    next.run(request).await
}
