//! In-process TTL cache for hot read paths.
//!
//! Disabled unless `cache.enabled` is set: every `get` then misses and
//! `set` does nothing, so callers never need to branch on it.

use crate::config::CacheConfig;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

pub struct CacheService {
    enabled: bool,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheService {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_seconds),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        debug!("Cache hit for {}", key);
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        if !self.enabled {
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping cache write for {}: {}", key, e);
                return;
            }
        };
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        if !self.enabled {
            return;
        }
        self.entries.write().await.retain(|key, _| !key.starts_with(prefix));
    }

    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
