//! Caller-supplied item caches consulted by pull operations.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Dedup/memo cache hook. The caching policy belongs to the implementor.
pub trait ItemCache: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Value>>;

    fn put<'a>(&'a self, key: String, payload: Value) -> CacheFuture<'a, ()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<Value> {
        self.map
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.payload.clone())
    }

    fn put(&mut self, key: String, payload: Value) {
        let expires_at = Instant::now() + self.ttl;
        self.map.insert(key, CacheEntry { payload, expires_at });
    }
}

/// TTL-bounded in-memory [`ItemCache`].
#[derive(Debug, Clone)]
pub struct MemoryItemCache {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl MemoryItemCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    /// Remove expired entries.
    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.inner
            .write()
            .await
            .map
            .retain(|_, entry| entry.expires_at > now);
    }

    /// Number of entries, including expired ones not yet cleared.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryItemCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ItemCache for MemoryItemCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Value>> {
        Box::pin(async move { self.inner.read().await.get(key) })
    }

    fn put<'a>(&'a self, key: String, payload: Value) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if inner.ttl == Duration::ZERO {
                return;
            }
            inner.put(key, payload);
        })
    }
}
