//! In-process TTL cache over the admin config service.
//!
//! Reads are served from memory while fresh. A stale key is refreshed by
//! exactly one caller at a time (per-key mutex), so N concurrent misses
//! issue one upstream fetch. When a refresh fails the last-known-good
//! value keeps being served; a key that has never been fetched reads as
//! absent and callers fall back to built-in defaults.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use hearth_core::types::{
    BackendSpec, ClassificationRule, FeatureFlag, Intent, IntentPolicy, ModeConfig, ModeOverride,
};

/// How long to wait before re-trying upstream after a failed refresh.
/// Stale values are served in the meantime.
const FAILED_FETCH_BACKOFF: Duration = Duration::from_secs(5);

/// Upstream request timeout. The admin service is on the local network;
/// anything slower than this is effectively down.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

struct CachedEntry {
    value: Value,
    fetched_at: Instant,
    last_attempt: Instant,
}

pub struct ConfigClient {
    http: reqwest::Client,
    base_url: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry>>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    last_success: RwLock<Option<Instant>>,
}

impl ConfigClient {
    pub fn new(base_url: &str, ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl,
            entries: RwLock::new(HashMap::new()),
            refresh_locks: DashMap::new(),
            last_success: RwLock::new(None),
        }
    }

    /// Enabled backends sorted ascending by priority. Empty when the admin
    /// service has never been reachable.
    pub async fn backends(&self) -> Vec<BackendSpec> {
        match self.fetch_cached("/api/llm-backends/public").await {
            Some(value) => parse_backends(&value),
            None => Vec::new(),
        }
    }

    /// All feature flags as a key → flag map.
    pub async fn flags(&self) -> HashMap<String, FeatureFlag> {
        match self.fetch_cached("/api/features/public").await {
            Some(value) => parse_flags(&value),
            None => HashMap::new(),
        }
    }

    pub async fn flag_bool(&self, key: &str, default: bool) -> bool {
        self.flags()
            .await
            .get(key)
            .map(|f| f.as_bool(default))
            .unwrap_or(default)
    }

    pub async fn flag_u64(&self, key: &str, default: u64) -> u64 {
        self.flags()
            .await
            .get(key)
            .map(|f| f.as_u64(default))
            .unwrap_or(default)
    }

    /// Admin-managed keyword classifier rules, in match order. Empty when
    /// unavailable; the classifier then uses its built-in table.
    pub async fn classification_rules(&self) -> Vec<ClassificationRule> {
        match self.fetch_cached("/api/classification-rules/public").await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// The admin policy row for one intent, or `None` when absent.
    pub async fn policy(&self, intent: Intent) -> Option<IntentPolicy> {
        let path = format!("/api/policy/{}", intent.as_str());
        let value = self.fetch_cached(&path).await?;
        serde_json::from_value(value).ok()
    }

    /// Mode loop settings. Defaults (disabled) when unavailable.
    pub async fn mode_config(&self) -> ModeConfig {
        match self.fetch_cached("/api/mode/public").await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => ModeConfig::default(),
        }
    }

    /// Admin-persisted mode overrides, unfiltered. The mode service
    /// decides which are active.
    pub async fn overrides(&self) -> Vec<ModeOverride> {
        match self.fetch_cached("/api/mode/overrides").await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Rolling performance writeback for one backend. Best-effort:
    /// failures are logged and swallowed.
    pub async fn report_backend_metrics(&self, backend_id: &str, latency_ms: u64, tokens_per_sec: f64) {
        let url = format!("{}/api/metrics/backend/{}", self.base_url, backend_id);
        let body = serde_json::json!({
            "latency_ms": latency_ms,
            "tokens_per_sec": tokens_per_sec,
        });
        let result = self
            .http
            .post(&url)
            .timeout(FETCH_TIMEOUT)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => debug!(backend_id, status = %resp.status(), "metrics writeback rejected"),
            Err(e) => debug!(backend_id, err = %e, "metrics writeback failed"),
        }
    }

    /// Age of the most recent successful upstream fetch, if any. Used by
    /// the health endpoint and the startup watchdog.
    pub async fn last_success_age(&self) -> Option<Duration> {
        self.last_success.read().await.map(|t| t.elapsed())
    }

    /// Serve `path` from the in-process cache, refreshing when stale.
    async fn fetch_cached(&self, path: &str) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(path) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Some(entry.value.clone());
                }
            }
        }

        // Stale or absent: only one caller per key refreshes.
        let lock = self
            .refresh_locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another waiter may have refreshed while we queued on the lock,
        // or a refresh may have just failed, don't hammer upstream.
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(path) {
                if entry.fetched_at.elapsed() < self.ttl
                    || entry.last_attempt.elapsed() < FAILED_FETCH_BACKOFF
                {
                    return Some(entry.value.clone());
                }
            }
        }

        let url = format!("{}{}", self.base_url, path);
        let fetched = self.fetch_upstream(&url).await;
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        match fetched {
            Some(value) => {
                entries.insert(
                    path.to_string(),
                    CachedEntry {
                        value: value.clone(),
                        fetched_at: now,
                        last_attempt: now,
                    },
                );
                *self.last_success.write().await = Some(now);
                Some(value)
            }
            None => match entries.get_mut(path) {
                // Refresh failed: serve last-known-good, remember the attempt.
                Some(entry) => {
                    entry.last_attempt = now;
                    warn!(path, "config refresh failed, serving last-known-good");
                    Some(entry.value.clone())
                }
                None => {
                    warn!(path, "config fetch failed with no last-known-good");
                    None
                }
            },
        }
    }

    async fn fetch_upstream(&self, url: &str) -> Option<Value> {
        let resp = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            debug!(url, status = %resp.status(), "admin config returned error status");
            return None;
        }
        resp.json::<Value>().await.ok()
    }
}

/// Parse the backend list, keeping only enabled rows, sorted ascending
/// by priority. Malformed rows are skipped rather than failing the set.
fn parse_backends(value: &Value) -> Vec<BackendSpec> {
    let rows = match value.as_array() {
        Some(rows) => rows,
        None => return Vec::new(),
    };
    let mut backends: Vec<BackendSpec> = rows
        .iter()
        .filter_map(|row| serde_json::from_value::<BackendSpec>(row.clone()).ok())
        .filter(|b| b.enabled)
        .collect();
    backends.sort_by_key(|b| b.priority);
    backends
}

fn parse_flags(value: &Value) -> HashMap<String, FeatureFlag> {
    let rows = match value.as_array() {
        Some(rows) => rows,
        None => return HashMap::new(),
    };
    rows.iter()
        .filter_map(|row| serde_json::from_value::<FeatureFlag>(row.clone()).ok())
        .map(|f| (f.key.clone(), f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_filtered_and_sorted() {
        let value = serde_json::json!([
            {"id": "b", "model_name": "m-large", "endpoint_url": "http://b", "enabled": true, "priority": 2},
            {"id": "a", "model_name": "m-small", "endpoint_url": "http://a", "enabled": true, "priority": 1},
            {"id": "c", "model_name": "m-off", "endpoint_url": "http://c", "enabled": false, "priority": 0},
        ]);
        let backends = parse_backends(&value);
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].id, "a");
        assert_eq!(backends[1].id, "b");
    }

    #[test]
    fn malformed_backend_rows_are_skipped() {
        let value = serde_json::json!([
            {"nope": true},
            {"id": "a", "model_name": "m", "endpoint_url": "http://a", "enabled": true, "priority": 1},
        ]);
        let backends = parse_backends(&value);
        assert_eq!(backends.len(), 1);
    }

    #[test]
    fn non_array_backend_payload_is_empty() {
        assert!(parse_backends(&serde_json::json!({"oops": 1})).is_empty());
    }

    #[test]
    fn flags_keyed_by_name() {
        let value = serde_json::json!([
            {"key": "enable_x", "value": true},
            {"key": "top_k", "value": 7},
        ]);
        let flags = parse_flags(&value);
        assert!(flags["enable_x"].as_bool(false));
        assert_eq!(flags["top_k"].as_u64(5), 7);
    }
}
