//! Concurrent dispatch: launch every selected provider at once, each
//! behind its own timeout and cache key, wait for all, fuse.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hearth_cache::keys::search_key;
use hearth_cache::{get_json, set_json, CacheStore, ConfigClient};
use hearth_core::types::{Intent, RetrievalResult};

use crate::fusion;
use crate::provider::Provider;
use crate::route::RouteTable;

pub struct RetrievalEngine {
    providers: HashMap<String, Arc<dyn Provider>>,
    routes: RouteTable,
    cache: Arc<dyn CacheStore>,
    config: Arc<ConfigClient>,
    provider_timeout: Duration,
    default_search_ttl: Duration,
    top_k: usize,
}

impl RetrievalEngine {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        config: Arc<ConfigClient>,
        provider_timeout: Duration,
        default_search_ttl: Duration,
    ) -> Self {
        Self {
            providers: HashMap::new(),
            routes: RouteTable::builtin(),
            cache,
            config,
            provider_timeout,
            default_search_ttl,
            top_k: 5,
        }
    }

    pub fn register(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Retrieve evidence for a classified query. Never raises: provider
    /// failures, timeouts, and cancellation all contribute empty lists,
    /// and an all-empty round is a valid "no supporting data" outcome.
    pub async fn retrieve(
        &self,
        intent: Intent,
        query: &str,
        entities: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Vec<RetrievalResult> {
        if !intent.requires_retrieval() {
            return Vec::new();
        }

        let mut flags = self.config.flags().await;
        let mut routes = self.routes.clone();
        routes.apply_overrides(&flags);

        let selected: Vec<Arc<dyn Provider>> = routes
            .providers_for(intent)
            .iter()
            .filter_map(|name| self.providers.get(name))
            .filter(|p| p.enabled())
            .cloned()
            .collect();
        if selected.is_empty() {
            debug!(%intent, "no enabled providers for intent");
            return Vec::new();
        }

        let location = entities.get("location").cloned().unwrap_or_default();
        let top_k = flags
            .remove("retrieval_top_k")
            .map(|f| f.as_u64(self.top_k as u64) as usize)
            .unwrap_or(self.top_k);

        // Providers run in parallel; the overall wait equals the slowest
        // per-provider timeout, not their sum.
        let fetches = selected
            .iter()
            .map(|provider| self.fetch_one(provider.clone(), query, &location, top_k, cancel));
        let lists = futures::future::join_all(fetches).await;

        fusion::fuse(lists, intent, top_k)
    }

    /// One provider round: cache lookup, then a timed fetch. Successful
    /// fetches (empty included) populate the cache so an identical query
    /// inside the TTL is answered without touching the provider.
    async fn fetch_one(
        &self,
        provider: Arc<dyn Provider>,
        query: &str,
        location: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Vec<RetrievalResult> {
        let name = provider.name().to_string();
        let key = search_key(&name, query, location);

        if let Some(hit) = get_json::<Vec<RetrievalResult>>(self.cache.as_ref(), &key).await {
            debug!(provider = %name, "search cache hit");
            return hit;
        }

        let ttl = provider
            .cache_ttl()
            .map(|t| t.min(self.default_search_ttl))
            .unwrap_or(self.default_search_ttl);
        let location_arg = (!location.is_empty()).then_some(location);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(provider = %name, "retrieval cancelled");
                return Vec::new();
            }
            outcome = tokio::time::timeout(
                self.provider_timeout,
                provider.search(query, location_arg, limit),
            ) => outcome,
        };

        match outcome {
            Ok(Ok(results)) => {
                set_json(self.cache.as_ref(), &key, &results, Some(ttl)).await;
                results
            }
            Ok(Err(e)) => {
                warn!(provider = %name, err = %e, "provider search failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    provider = %name,
                    timeout_secs = self.provider_timeout.as_secs_f64(),
                    "provider timed out"
                );
                Vec::new()
            }
        }
    }
}
