//! Speedmark traffic server library
//!
//! Stateless request handlers providing synthetic download payloads and a
//! null upload sink, used as the network payload source/sink during a
//! measurement session. Exposed as a library so integration tests can
//! drive the router without a TCP listener.

pub mod handlers;
pub mod metrics;
pub mod payload;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use speedmark_common::cors::AllowList;

use crate::metrics::MetricsHandle;

/// Shared handler state. Stateless across requests apart from the
/// optional append-only metrics channel.
#[derive(Clone)]
pub struct AppState {
    pub allow_list: AllowList,
    pub max_upload_bytes: u64,
    pub metrics: Option<MetricsHandle>,
}

/// Build the traffic server router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/__down",
            get(handlers::download).options(handlers::preflight),
        )
        .route(
            "/__up",
            post(handlers::upload).options(handlers::preflight),
        )
        .route(
            "/health",
            get(handlers::health).options(handlers::preflight),
        )
        .fallback(handlers::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
