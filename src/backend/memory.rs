//! In-process cache backend with TTL expiry.
//!
//! Suitable for tests and single-process deployments. Entries expire lazily
//! on access; counters are stored as ASCII decimal so they interoperate
//! with values written by the engine's counter operations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};

struct StoredEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let expires_at = (ttl > Duration::ZERO).then(|| Instant::now() + ttl);
        Self { value, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Thread-safe in-memory [`CacheBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|entry| !entry.is_expired()).count()
    }

    /// Whether no live entries exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn parse_counter(bytes: &[u8]) -> CacheResult<u64> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
            .ok_or_else(|| CacheError::Transport("stored value is not a counter".to_string()))
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!(key, "entry expired");
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn get_bulk(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        let mut entries = self.entries.write().await;
        let mut found = HashMap::new();
        for key in keys {
            match entries.get(key.as_str()) {
                Some(entry) if entry.is_expired() => {
                    entries.remove(key.as_str());
                }
                Some(entry) => {
                    found.insert(key.clone(), entry.value.clone());
                }
                None => {}
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, ttl: Duration, value: Vec<u8>) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, by: u64, initial: u64, ttl: Duration) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                let current = Self::parse_counter(&entry.value)?;
                let next = current.saturating_add(by);
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    StoredEntry::new(initial.to_string().into_bytes(), ttl),
                );
                Ok(initial)
            }
        }
    }

    async fn decr(&self, key: &str, by: u64) -> CacheResult<Option<u64>> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                let current = Self::parse_counter(&entry.value)?;
                let next = current.saturating_sub(by);
                entry.value = next.to_string().into_bytes();
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();
        backend
            .set("k1", Duration::from_secs(60), b"v1".to_vec())
            .await
            .unwrap();

        assert_eq!(backend.get("k1").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new();
        backend
            .set("k1", Duration::from_millis(20), b"v1".to_vec())
            .await
            .unwrap();

        assert!(backend.get("k1").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(backend.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let backend = MemoryBackend::new();
        backend.set("k1", Duration::ZERO, b"v1".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("k1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_bulk_partial_miss() {
        let backend = MemoryBackend::new();
        backend.set("a", Duration::ZERO, b"1".to_vec()).await.unwrap();
        backend.set("c", Duration::ZERO, b"3".to_vec()).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = backend.get_bulk(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a"), Some(&b"1".to_vec()));
        assert!(!found.contains_key("b"));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();
        backend.set("k1", Duration::ZERO, b"v1".to_vec()).await.unwrap();
        backend.delete("k1").await.unwrap();
        assert!(backend.get("k1").await.unwrap().is_none());

        // deleting an absent key is not an error
        backend.delete("k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_many() {
        let backend = MemoryBackend::new();
        backend.set("a", Duration::ZERO, b"1".to_vec()).await.unwrap();
        backend.set("b", Duration::ZERO, b"2".to_vec()).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
        backend.delete_many(&keys).await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_counter_round_trip() {
        let backend = MemoryBackend::new();

        // absent key is created with the initial value
        assert_eq!(
            backend.incr("hits", 5, 1, Duration::ZERO).await.unwrap(),
            1
        );
        assert_eq!(
            backend.incr("hits", 5, 1, Duration::ZERO).await.unwrap(),
            6
        );

        assert_eq!(backend.decr("hits", 2).await.unwrap(), Some(4));
        // floored at zero
        assert_eq!(backend.decr("hits", 100).await.unwrap(), Some(0));
        // absent key decrements to nothing
        assert_eq!(backend.decr("missing", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_counter_value() {
        let backend = MemoryBackend::new();
        backend
            .set("k1", Duration::ZERO, b"not a number".to_vec())
            .await
            .unwrap();
        assert!(backend.incr("k1", 1, 0, Duration::ZERO).await.is_err());
    }
}
