//! In-memory store with lazy and sweep-driven expiry
//!
//! Expiry is measured on the tokio clock so paused-time tests are exact.

use crate::{validate_key, Store, StorageResult};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Thread-safe in-memory keyed store
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V> MemoryStore<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(16)),
        }
    }

    /// Number of stored items, including expired ones not yet purged
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> StorageResult<Option<V>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> StorageResult<()> {
        validate_key(key)?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> StorageResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("a", 1u32, None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(1));
        assert!(store.remove("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();
        store.set("a", 1u32, None).await.unwrap();
        store.set("a", 2u32, None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(2));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_items_are_invisible_before_purge() {
        let store = MemoryStore::new();
        store
            .set("short", "x".to_string(), Some(Duration::from_millis(1000)))
            .await
            .unwrap();
        store.set("forever", "y".to_string(), None).await.unwrap();

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(store.get("short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap(), vec!["forever".to_string()]);
        // Still physically present until purged
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_returns_keys() {
        let store = MemoryStore::new();
        store
            .set("a", 1u8, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store
            .set("b", 2u8, Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let purged = store.purge_expired().await.unwrap();

        assert_eq!(purged, vec!["a".to_string()]);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("b").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.set("a", 1u32, None).await.unwrap();
        store.set("b", 2u32, None).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = MemoryStore::new();
        assert!(store.set("", 1u32, None).await.is_err());
    }
}
