use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /health, liveness plus per-component status and current mode.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cache_ok = state.cache.ping().await;

    let config_ttl = Duration::from_secs(state.settings.config_refresh_ttl_seconds);
    let config_status = match state.config.last_success_age().await {
        Some(age) if age < config_ttl * 2 => "ok",
        Some(_) => "stale",
        None => "unreachable",
    };

    let model_status = if state.config.backends().await.is_empty() {
        "default-only"
    } else {
        "ok"
    };

    let status = if cache_ok && config_status == "ok" {
        "healthy"
    } else {
        "degraded"
    };

    let snapshot = state.mode.current();
    Json(json!({
        "status": status,
        "mode": snapshot.mode,
        "components": {
            "cache": if cache_ok { "ok" } else { "unreachable" },
            "config": config_status,
            "model": model_status,
        },
    }))
}
