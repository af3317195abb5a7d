//! OpenAI-style model listing, derived from admin backends.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET /v1/models
pub async fn models_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let backends = state.config.backends().await;

    let mut data: Vec<Value> = backends
        .iter()
        .map(|b| {
            json!({
                "id": b.model_name,
                "object": "model",
                "created": created,
                "owned_by": "hearth",
            })
        })
        .collect();

    if data.is_empty() {
        data.push(json!({
            "id": "default",
            "object": "model",
            "created": created,
            "owned_by": "hearth",
        }));
    }

    Json(json!({ "object": "list", "data": data }))
}
