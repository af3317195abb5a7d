//! OpenAI-compatible /v1/chat/completions endpoint, the admission
//! front door. Each request is routed either through the orchestrator
//! or straight to a model backend; the response is the standard
//! chat-completion envelope either way. Streaming is not supported.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use hearth_cache::keys::hash8;
use hearth_core::types::{Intent, QueryRequest, MAX_QUERY_BYTES};

use crate::app::AppState;
use crate::passthrough;
use crate::router_classifier::Route;

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<OpenAiRequest>,
) -> Response {
    if req.stream {
        return error_response(
            StatusCode::BAD_REQUEST,
            "streaming is not supported",
            "invalid_request_error",
        );
    }
    let Some(query) = req.last_user_message() else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "no user message found",
            "invalid_request_error",
        );
    };
    if query.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "empty query",
            "invalid_request_error",
        );
    }
    if query.len() > MAX_QUERY_BYTES {
        return error_response(
            StatusCode::BAD_REQUEST,
            "query exceeds 4 KiB",
            "invalid_request_error",
        );
    }

    // Session identity: an explicit header wins; otherwise a stable
    // hash of the conversation prefix keeps multi-turn clients on one
    // session without any cooperation from them.
    let header_session = headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let session_id = header_session
        .clone()
        .unwrap_or_else(|| format!("conv-{}", hash8(&req.conversation_prefix())));

    // Rate limit per session when identified, per client IP otherwise.
    let limit = state
        .policy
        .policy_for(Intent::General)
        .await
        .rate_limit_per_minute;
    let limiter_key = header_session.unwrap_or_else(|| addr.ip().to_string());
    if !state.limiter.allow(&limiter_key, limit) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            &format!("rate limit of {limit} queries per minute exceeded"),
            "rate_limit_error",
        );
    }

    let route = state.router.decide(&query).await;
    info!(?route, model = %req.model, "admission decision");

    match route {
        Route::Orchestrator => {
            let request = QueryRequest {
                request_id: uuid::Uuid::new_v4().to_string(),
                query,
                session_id: Some(session_id),
                user_id: None,
                context: BTreeMap::new(),
            };
            let result = state.orchestrator.handle(request).await;
            let reply = OpenAiResponse {
                id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
                object: "chat.completion".to_string(),
                created: chrono::Utc::now().timestamp(),
                model: req.model.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: OpenAiMessage {
                        role: "assistant".to_string(),
                        content: Some(result.answer.clone()),
                    },
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            };
            (StatusCode::OK, Json(reply)).into_response()
        }
        Route::Passthrough => match passthrough::forward(&state, &req).await {
            Ok(upstream) => (StatusCode::OK, Json(upstream)).into_response(),
            Err(message) => error_response(StatusCode::BAD_GATEWAY, &message, "upstream_error"),
        },
    }
}

fn error_response(status: StatusCode, message: &str, error_type: &str) -> Response {
    (status, Json(OpenAiError::new(message, error_type))).into_response()
}

// ── OpenAI API types ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl OpenAiRequest {
    pub fn last_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
    }

    /// Everything before the final user turn, flattened for hashing.
    pub fn conversation_prefix(&self) -> String {
        let last_user = self
            .messages
            .iter()
            .rposition(|m| m.role == "user")
            .unwrap_or(self.messages.len());
        let mut prefix = self.model.clone();
        for message in &self.messages[..last_user] {
            prefix.push('\n');
            prefix.push_str(&message.role);
            prefix.push(':');
            prefix.push_str(message.content.as_deref().unwrap_or_default());
        }
        prefix
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Serialize)]
pub struct OpenAiResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: OpenAiMessage,
    pub finish_reason: String,
}

#[derive(Serialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Serialize)]
pub struct OpenAiError {
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl OpenAiError {
    pub fn new(message: &str, error_type: &str) -> Self {
        Self {
            error: ErrorBody {
                message: message.to_string(),
                error_type: error_type.to_string(),
            },
        }
    }
}
