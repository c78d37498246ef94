//! Speedmark credential broker library
//!
//! Exchanges a long-lived relay service secret for short-lived relay
//! credentials, gated by request-origin checks. The long-lived secret
//! never leaves the broker.

pub mod handlers;

use axum::Router;
use axum::routing::any;
use tower_http::trace::TraceLayer;

use speedmark_common::cors::AllowList;

/// Broker configuration and shared clients.
#[derive(Clone)]
pub struct AppState {
    pub allow_list: AllowList,
    /// Upstream credential API base; the token id and the
    /// `credentials/generate` action are appended.
    pub upstream_base: String,
    pub token_id: String,
    pub token_secret: String,
    pub ttl_seconds: u64,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn upstream_url(&self) -> String {
        format!(
            "{}/{}/credentials/generate",
            self.upstream_base.trim_end_matches('/'),
            self.token_id
        )
    }
}

/// Build the broker router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/turn-credentials", any(handlers::turn_credentials))
        .fallback(handlers::fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
