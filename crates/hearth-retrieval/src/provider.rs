//! The retrieval provider contract and the HTTP adapter for the
//! retrieval microservices.
//!
//! Every upstream service speaks the same wire shape,
//! `{results: [{title, snippet, url?, confidence?, metadata?}], source, fetched_at}`,
//! so a single adapter covers the whole fleet; each instance differs
//! only in name, endpoint, and cache TTL.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use hearth_core::types::RetrievalResult;

use crate::error::{ProviderError, Result};

/// A retrieval backend. Implementations must be cheap to call
/// concurrently; the engine fans out across all selected providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, becomes `RetrievalResult::source`.
    fn name(&self) -> &str;

    /// Whether the provider's dependency (endpoint, API key) is
    /// configured. Disabled providers are skipped by the router.
    fn enabled(&self) -> bool {
        true
    }

    /// Provider-specific cache TTL override; `None` uses the intent
    /// default.
    fn cache_ttl(&self) -> Option<Duration> {
        None
    }

    /// Search the provider. `location` narrows geographically scoped
    /// queries; `limit` caps the returned list.
    async fn search(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>>;
}

/// HTTP adapter for one retrieval microservice.
pub struct RetrievalService {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
    cache_ttl: Option<Duration>,
}

impl RetrievalService {
    pub fn new(name: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client: reqwest::Client::new(),
            timeout,
            cache_ttl: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

#[async_trait]
impl Provider for RetrievalService {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    async fn search(
        &self,
        query: &str,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if !self.enabled() {
            return Err(ProviderError::NotConfigured(self.name.clone()));
        }

        let url = format!("{}/query", self.base_url);
        let mut body = serde_json::json!({
            "query": query,
            "limit": limit,
        });
        if let Some(location) = location {
            body["location"] = serde_json::Value::String(location.to_string());
        }

        debug!(provider = %self.name, "dispatching search");

        let mut request = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                ProviderError::Http(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, "search request rejected");
            return Err(ProviderError::Api { status, message });
        }

        let wire: WireResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(normalise(wire, &self.name, limit))
    }
}

/// Convert the wire response into `RetrievalResult`s, dropping items
/// with no title and clamping confidence into [0, 1].
fn normalise(wire: WireResponse, provider: &str, limit: usize) -> Vec<RetrievalResult> {
    let source = if wire.source.is_empty() {
        provider.to_string()
    } else {
        wire.source
    };
    let fetched_at = wire.fetched_at.unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    wire.results
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .take(limit)
        .map(|r| {
            let mut metadata = r.metadata.unwrap_or_default();
            metadata.insert(
                "fetched_at".to_string(),
                serde_json::Value::String(fetched_at.clone()),
            );
            RetrievalResult {
                source: source.clone(),
                title: r.title,
                snippet: r.snippet.unwrap_or_default(),
                url: r.url,
                confidence: r.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                metadata,
            }
        })
        .collect()
}

// Wire types (deserialization only).

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    results: Vec<WireResult>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    fetched_at: Option<String>,
}

#[derive(Deserialize)]
struct WireResult {
    title: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
}
