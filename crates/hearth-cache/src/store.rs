//! Distributed cache client. One `RedisStore` is created at startup and
//! shared process-wide; the underlying `ConnectionManager` multiplexes a
//! single connection and is cheap to clone per call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Key/value cache contract. Implementations must be safe for concurrent
/// use and must never propagate transport errors, absent values, decode
/// failures, and unreachable backends all read as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw string value for `key`, or `None` on miss.
    async fn get_raw(&self, key: &str) -> Option<String>;

    /// Best-effort write. `ttl = None` stores without expiry.
    async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>);

    /// Best-effort delete; idempotent.
    async fn delete(&self, key: &str);

    /// Health probe for the /health endpoint.
    async fn ping(&self) -> bool;
}

/// Decode a cached JSON value. A value that fails to deserialize is
/// treated as a miss, stale shapes from older builds age out naturally.
pub async fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    let raw = store.get_raw(key).await?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(key, err = %e, "cached value failed to decode, treating as miss");
            None
        }
    }
}

/// Encode and store a JSON value. Serialization failures are logged and
/// swallowed like any other cache fault.
pub async fn set_json<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set_raw(key, &raw, ttl).await,
        Err(e) => warn!(key, err = %e, "failed to encode cache value"),
    }
}

/// Redis-backed [`CacheStore`].
pub struct RedisStore {
    manager: ConnectionManager,
    /// Epoch seconds of the last unreachable-cache warning, so a dead
    /// cache logs at warn once per minute instead of once per call.
    last_warn_epoch: AtomicU64,
}

impl RedisStore {
    /// Connect to the cache. Fails only at startup, once constructed,
    /// transient outages degrade to misses.
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            last_warn_epoch: AtomicU64::new(0),
        })
    }

    fn log_transport_error(&self, op: &str, err: &redis::RedisError) {
        let now = chrono::Utc::now().timestamp() as u64;
        let last = self.last_warn_epoch.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= 60
            && self
                .last_warn_epoch
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            warn!(op, err = %err, "cache unreachable, operating without it");
        } else {
            debug!(op, err = %err, "cache operation failed");
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let mut con = self.manager.clone();
        let result: redis::RedisResult<Option<String>> =
            redis::cmd("GET").arg(key).query_async(&mut con).await;
        match result {
            Ok(v) => v,
            Err(e) => {
                self.log_transport_error("GET", &e);
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut con = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let result: redis::RedisResult<()> = cmd.query_async(&mut con).await;
        if let Err(e) = result {
            self.log_transport_error("SET", &e);
        }
    }

    async fn delete(&self, key: &str) {
        let mut con = self.manager.clone();
        let result: redis::RedisResult<()> =
            redis::cmd("DEL").arg(key).query_async(&mut con).await;
        if let Err(e) = result {
            self.log_transport_error("DEL", &e);
        }
    }

    async fn ping(&self) -> bool {
        let mut con = self.manager.clone();
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut con).await;
        matches!(result.as_deref(), Ok("PONG"))
    }
}
