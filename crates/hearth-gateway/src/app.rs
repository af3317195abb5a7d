use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use hearth_cache::{CacheStore, ConfigClient};
use hearth_core::config::Settings;
use hearth_mode::{ModeHandle, PolicyEngine};
use hearth_orchestrator::Orchestrator;

use crate::ratelimit::RateLimiter;
use crate::router_classifier::RouterClassifier;

/// Central shared state, passed as `Arc<AppState>` to all handlers.
pub struct AppState {
    pub settings: Settings,
    pub config: Arc<ConfigClient>,
    pub cache: Arc<dyn CacheStore>,
    pub mode: ModeHandle,
    pub policy: PolicyEngine,
    pub orchestrator: Orchestrator,
    pub router: RouterClassifier,
    pub limiter: RateLimiter,
    /// Client for passthrough forwarding to model backends.
    pub http: reqwest::Client,
}

/// Assemble the full axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/query", post(crate::http::query::query_handler))
        .route("/mode/current", get(crate::http::mode::current_handler))
        .route("/mode/events", get(crate::http::mode::events_handler))
        .route(
            "/v1/chat/completions",
            post(crate::http::chat::chat_completions),
        )
        .route("/v1/models", get(crate::http::models::models_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
