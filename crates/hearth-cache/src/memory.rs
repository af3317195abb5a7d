//! In-memory [`CacheStore`] used by tests and by local development runs
//! where no distributed cache is available.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::CacheStore;

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        let (value, expires) = entry.value();
        if let Some(deadline) = expires {
            if Instant::now() >= *deadline {
                drop(entry);
                self.entries.remove(key);
                return None;
            }
        }
        Some(value.clone())
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let expires = ttl.map(|t| Instant::now() + t);
        self.entries
            .insert(key.to_string(), (value.to_string(), expires));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn ping(&self) -> bool {
        true
    }
}
