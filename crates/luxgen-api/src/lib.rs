//! LuxGen Platform API
//!
//! HTTP surface over tenant resolution and workflow execution.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         LUXGEN API                               │
//! │                                                                  │
//! │  request ─► trace ─► auth ─► tenant ─► rate limit ─► handler     │
//! │                       │        │           │            │        │
//! │                  Principal  TenantContext  headers   engine      │
//! │                                                                  │
//! │  ┌───────────────┐  ┌────────────────┐  ┌─────────────────────┐  │
//! │  │ JwtAuth       │  │ TenantResolver │  │ WorkflowEngine      │  │
//! │  │ (jsonwebtoken)│  │ Isolation      │  │ registry + store    │  │
//! │  └───────────────┘  └────────────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::PlatformConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1", api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/tenant", routes::tenant::router())
        .nest("/workflows", routes::workflows::router())
        .merge(routes::executions::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::enforce_rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::tenant::resolve_tenant,
        ))
        .layer(axum::middleware::from_fn_with_state(state, middleware::auth::authenticate))
}

/// Periodically evict finished executions past the retention window and
/// expired rate-limit windows
pub fn spawn_cleanup(state: &AppState, config: &crate::config::WorkflowsConfig) -> JoinHandle<()> {
    let engine = Arc::clone(&state.engine);
    let isolation = Arc::clone(&state.isolation);
    let retention = config.retention();
    let period = config.cleanup_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = engine.cleanup(retention);
            let purged = isolation.purge_rate_limits();
            if removed > 0 || purged > 0 {
                tracing::debug!(removed, purged, "cleanup pass finished");
            }
        }
    })
}
