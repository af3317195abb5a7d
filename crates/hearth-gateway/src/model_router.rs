//! Backend-routed chat model with failover and performance writeback.
//!
//! Backends come from admin config, tried in priority order; the
//! `MODEL_BACKEND_URL` default is the last resort. Every completed call
//! reports latency and throughput back to the admin store, failures
//! there are logged and swallowed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use hearth_cache::ConfigClient;
use hearth_core::model::{ChatCompletion, ChatModel, ChatRequest, ModelError};
use hearth_core::types::BackendSpec;
use hearth_orchestrator::HttpChatModel;

/// Append the chat path when the configured URL is a bare host.
pub fn completions_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.contains("/v1/") || trimmed.contains("/api/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

pub struct RoutedModel {
    config: Arc<ConfigClient>,
    fallback: Arc<HttpChatModel>,
    clients: DashMap<String, Arc<HttpChatModel>>,
}

impl RoutedModel {
    pub fn new(config: Arc<ConfigClient>, default_endpoint: &str, default_timeout: Duration) -> Self {
        let fallback = Arc::new(HttpChatModel::new(
            "default",
            &completions_url(default_endpoint),
            "default",
            default_timeout,
        ));
        Self {
            config,
            fallback,
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, spec: &BackendSpec) -> Arc<HttpChatModel> {
        self.clients
            .entry(spec.id.clone())
            .or_insert_with(|| {
                Arc::new(HttpChatModel::new(
                    &spec.id,
                    &completions_url(&spec.endpoint_url),
                    &spec.model_name,
                    Duration::from_secs(spec.timeout_seconds),
                ))
            })
            .clone()
    }

    fn report(&self, backend_id: &str, latency: Duration, tokens_out: u32) {
        let latency_ms = latency.as_millis() as u64;
        let tokens_per_sec = if latency.as_secs_f64() > 0.0 {
            tokens_out as f64 / latency.as_secs_f64()
        } else {
            0.0
        };
        let config = self.config.clone();
        let backend_id = backend_id.to_string();
        tokio::spawn(async move {
            config
                .report_backend_metrics(&backend_id, latency_ms, tokens_per_sec)
                .await;
        });
    }
}

#[async_trait]
impl ChatModel for RoutedModel {
    fn name(&self) -> &str {
        "routed"
    }

    /// Try each enabled backend in priority order, then the default
    /// endpoint. The last error is returned only when everything fails.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion, ModelError> {
        let backends = self.config.backends().await;
        let mut last_err: Option<ModelError> = None;

        for spec in &backends {
            let client = self.client_for(spec);
            let started = Instant::now();
            match client.complete(req).await {
                Ok(completion) => {
                    self.report(&spec.id, started.elapsed(), completion.tokens_out);
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(backend = %spec.id, err = %e, "backend failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        if !backends.is_empty() {
            info!("all configured backends failed, using default endpoint");
        }
        let started = Instant::now();
        match self.fallback.complete(req).await {
            Ok(completion) => {
                self.report("default", started.elapsed(), completion.tokens_out);
                Ok(completion)
            }
            Err(e) => Err(last_err.unwrap_or(e)),
        }
    }
}
