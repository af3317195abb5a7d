//! Internal orchestrator endpoint: POST /query.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use hearth_core::types::{QueryRequest, MAX_QUERY_BYTES};
use hearth_orchestrator::QueryResponse;

use crate::app::AppState;
use crate::http::chat::OpenAiError;

#[derive(Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// POST /query, run one orchestration and return the full result,
/// validation and telemetry included.
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryBody>,
) -> Response {
    if body.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(OpenAiError::new("empty query", "invalid_request_error")),
        )
            .into_response();
    }
    if body.query.len() > MAX_QUERY_BYTES {
        return (
            StatusCode::BAD_REQUEST,
            Json(OpenAiError::new("query exceeds 4 KiB", "invalid_request_error")),
        )
            .into_response();
    }

    let request = QueryRequest {
        request_id: uuid::Uuid::new_v4().to_string(),
        query: body.query,
        session_id: body.session_id,
        user_id: body.user_id,
        context: body.context,
    };

    let result = state.orchestrator.handle(request).await;
    let response: QueryResponse = result.into_response();
    (StatusCode::OK, Json(response)).into_response()
}
