pub mod access;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod pagination;
pub mod session;
pub mod treasures;
pub mod users;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::FromRef,
    http::{header, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{ApiJson, ApiPath, ApiQuery, AppError, AppResult, FieldErrors};

use auth::TokenIssuer;
use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub tokens: TokenIssuer,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            tokens: TokenIssuer::from_config(&config),
            config: Arc::new(config),
        }
    }
}

/// The whole HTTP surface, sessions and all.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_inactivity_minutes,
        )));

    // credentials are allowed, so origins are mirrored rather than `*`
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(treasures::router())
        .merge(users::router())
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[debug_handler]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[debug_handler]
async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("Method not allowed.")
}

#[debug_handler]
async fn not_found() -> AppError {
    AppError::NotFound
}

pub(crate) const PREVIEW_CHARS: usize = 50;

/// First `max` characters of `text`, with `...` appended iff anything was cut.
pub fn ellipsize(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
