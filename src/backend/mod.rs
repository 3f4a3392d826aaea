//! The opaque remote-cache capability.
//!
//! The engine talks to any key-value cache through [`CacheBackend`]. Values
//! cross this boundary as raw bytes; the engine owns the serde boundary and
//! the null-sentinel byte form. Counter values are ASCII decimal, the
//! memcached counter convention.

pub mod memory;

pub use memory::MemoryBackend;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Remote key-value cache operations the engine consumes.
///
/// All operations may fail with a distinguishable timeout versus generic
/// transport error. Implementations must be thread-safe; the engine calls
/// them concurrently from many tasks.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch one value, or `None` when the key is absent.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Bulk lookup. Absent keys are simply missing from the returned map;
    /// partial misses are never an error. No ordering is guaranteed.
    async fn get_bulk(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>>;

    /// Store a value. A zero TTL means no expiry.
    async fn set(&self, key: &str, ttl: Duration, value: Vec<u8>) -> CacheResult<()>;

    /// Remove one key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Remove several keys. The default implementation deletes one at a
    /// time and stops at the first transport error. The engine's
    /// invalidation path does not use this; it needs per-key error
    /// isolation and issues independent `delete` calls instead. Backends
    /// with a native bulk delete can override it for direct callers.
    async fn delete_many(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Atomic increment. The key is created holding `initial` (with `ttl`)
    /// when absent; otherwise the stored counter grows by `by`. Returns the
    /// resulting value.
    async fn incr(&self, key: &str, by: u64, initial: u64, ttl: Duration) -> CacheResult<u64>;

    /// Atomic decrement, floored at zero. Returns `None` when the key is
    /// absent.
    async fn decr(&self, key: &str, by: u64) -> CacheResult<Option<u64>>;
}
