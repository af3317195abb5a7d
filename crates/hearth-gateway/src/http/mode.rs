//! Mode service diagnostics endpoints.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /mode/current, the published snapshot, whole.
pub async fn current_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.mode.current();
    Json(serde_json::to_value(snapshot.as_ref()).unwrap_or_else(|_| json!({})))
}

/// GET /mode/events, the most recently parsed calendar events.
pub async fn events_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let events = state.mode.recent_events().await;
    Json(json!({ "events": events }))
}
