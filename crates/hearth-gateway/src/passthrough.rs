//! Passthrough path: forward a chat-completions request to a model
//! backend without orchestration.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use hearth_core::types::BackendSpec;

use crate::app::AppState;
use crate::http::chat::OpenAiRequest;
use crate::model_router::completions_url;

/// Pick the backend for a requested model: an exact model-name match
/// wins, otherwise the lowest-priority enabled backend. `None` means
/// the default endpoint serves the request.
pub fn select_backend<'a>(
    backends: &'a [BackendSpec],
    requested_model: &str,
) -> Option<&'a BackendSpec> {
    backends
        .iter()
        .find(|b| b.model_name == requested_model)
        .or_else(|| backends.first())
}

/// Forward the request to the best-matching backend and return the
/// upstream response body untouched. The error string is user-safe.
pub async fn forward(state: &AppState, req: &OpenAiRequest) -> Result<Value, String> {
    let backends = state.config.backends().await;
    let chosen = select_backend(&backends, &req.model);

    let (backend_id, url, model_name, timeout_seconds, max_tokens, temperature) = match chosen {
        Some(b) => (
            b.id.clone(),
            completions_url(&b.endpoint_url),
            b.model_name.clone(),
            b.timeout_seconds,
            req.max_tokens.unwrap_or(b.max_tokens),
            req.temperature.unwrap_or(b.temperature_default),
        ),
        None => (
            "default".to_string(),
            completions_url(state.settings.model_backend_url()),
            req.model.clone(),
            30,
            req.max_tokens.unwrap_or(1024),
            req.temperature.unwrap_or(0.7),
        ),
    };

    let body = serde_json::json!({
        "model": model_name,
        "messages": req.messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
        "stream": false,
    });

    debug!(backend = %backend_id, "forwarding passthrough request");
    let started = Instant::now();

    let resp = state
        .http
        .post(&url)
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            warn!(backend = %backend_id, err = %e, "passthrough forward failed");
            "model backend unreachable".to_string()
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        warn!(backend = %backend_id, %status, "passthrough backend rejected request");
        return Err(format!("model backend returned {status}"));
    }

    let value: Value = resp
        .json()
        .await
        .map_err(|_| "model backend returned malformed JSON".to_string())?;

    // Performance writeback; fire and forget.
    let latency = started.elapsed();
    let tokens_out = value
        .pointer("/usage/completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as f64;
    let tokens_per_sec = if latency.as_secs_f64() > 0.0 {
        tokens_out / latency.as_secs_f64()
    } else {
        0.0
    };
    let config = state.config.clone();
    tokio::spawn(async move {
        config
            .report_backend_metrics(&backend_id, latency.as_millis() as u64, tokens_per_sec)
            .await;
    });

    Ok(value)
}
