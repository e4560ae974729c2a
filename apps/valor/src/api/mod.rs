//! # Valor HTTP API Module
//!
//! The HTTP REST API over one sheet session, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Entity and collection counts
//! - `GET /entities/{id}` - MetaData row and payload
//! - `GET /entities/{id}/descendants` - Subtree, breadth first (`?depth=`)
//! - `GET /entities/{id}/trail` - Ancestors, nearest first
//! - `POST /entities/{create,update,delete,embed,transfer,eject}` - Mutations
//! - `POST /feed` - Apply an external change feed
//! - `GET /characters/{id}/totals` - Point totals
//! - `GET /characters/{id}/derived` - Every derived value of a sheet
//!
//! ## Security Configuration
//!
//! Taken from `AppConfig` (see `config`): `api_key`, `rate_limit`,
//! `cors_origins`.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{ApiKey, api_key_auth_middleware, keys_match};
pub use handlers::{
    ApiError, MAX_BATCH_ITEMS, create_handler, delete_handler, derived_handler,
    descendants_handler, eject_handler, embed_handler, entity_handler, feed_handler,
    health_handler, status_handler, totals_handler, trail_handler, transfer_handler,
    update_handler,
};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    DescendantsQuery, EntityResponse, ErrorResponse, HealthResponse, IdentityList, MutationBody,
    OneOrMany, StatusResponse,
};

use crate::config::AppConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use valor_core::Session;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the sheet session.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// `*` allows everything, a comma-separated list allows those origins,
/// anything else falls back to localhost.
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins; do not use this in production");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!(origin = trimmed, "CORS: allowing origin");
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!(origin = trimmed, error = %e, "CORS: invalid origin");
                            None
                        }
                    }
                })
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: no valid origins configured, defaulting to localhost");
                build_localhost_cors()
            } else {
                restricted_cors(allowed)
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with every endpoint and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if a key is configured).
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/entities/{id}", get(handlers::entity_handler))
        .route("/entities/{id}/descendants", get(handlers::descendants_handler))
        .route("/entities/{id}/trail", get(handlers::trail_handler))
        .route("/entities/create", post(handlers::create_handler))
        .route("/entities/update", post(handlers::update_handler))
        .route("/entities/delete", post(handlers::delete_handler))
        .route("/entities/embed", post(handlers::embed_handler))
        .route("/entities/transfer", post(handlers::transfer_handler))
        .route("/entities/eject", post(handlers::eject_handler))
        .route("/feed", post(handlers::feed_handler))
        .route("/characters/{id}/totals", get(handlers::totals_handler))
        .route("/characters/{id}/derived", get(handlers::derived_handler));

    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::from(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED; set VALOR_API_KEY to require a bearer key"
        ),
    }

    if config.rate_limit > 0 {
        tracing::info!(rps = config.rate_limit, "rate limiting enabled");
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(config.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("rate limiting disabled");
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(build_cors_layer(config.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind `config.addr()` and serve until the process stops.
pub async fn run_server(config: &AppConfig, session: Session) -> std::io::Result<()> {
    let router = create_router(AppState::new(session), config);
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "Valor HTTP server listening");

    axum::serve(listener, router).await
}
