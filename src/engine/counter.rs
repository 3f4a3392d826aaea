//! Counter operations.
//!
//! Counters are stored as ASCII decimal. Counter reads degrade on cache
//! failure like any other read; increments and decrements propagate
//! backend errors instead, since the caller consumes the returned count
//! and there is nothing to degrade to.

use std::future::Future;

use tracing::{debug, warn};

use crate::descriptor::OperationKind;
use crate::engine::{value, CacheGate};
use crate::error::{CacheGateError, Result};
use crate::key::KeyPart;

impl CacheGate {
    /// Atomically increment a counter, creating it with `initial` when
    /// absent. The declared TTL (zero for no expiry) applies on creation.
    pub async fn incr(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        by: u64,
        initial: u64,
    ) -> Result<u64> {
        let descriptor = self.resolve(operation, OperationKind::Increment)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;
        let backend = self.backend(&descriptor)?;
        let count = backend
            .incr(&cache_key, by, initial, descriptor.expiration)
            .await?;
        debug!(key = %cache_key, count, "counter incremented");
        Ok(count)
    }

    /// Atomically decrement a counter, floored at zero. Returns `None`
    /// when the counter does not exist.
    pub async fn decr(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        by: u64,
    ) -> Result<Option<u64>> {
        let descriptor = self.resolve(operation, OperationKind::Decrement)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;
        let backend = self.backend(&descriptor)?;
        let count = backend.decr(&cache_key, by).await?;
        debug!(key = %cache_key, ?count, "counter decremented");
        Ok(count)
    }

    /// Read a counter value, computing and storing it on miss.
    ///
    /// A cache failure or an undecodable stored value degrades to a miss;
    /// the loader's count is then written back best-effort.
    pub async fn read_counter<F, Fut, E>(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        loader: F,
    ) -> Result<u64>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<u64, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::ReadCounter)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;
        let backend = self.backend(&descriptor)?;

        match backend.get(&cache_key).await {
            Ok(Some(bytes)) => match value::decode_counter(&bytes) {
                Ok(count) => {
                    debug!(key = %cache_key, count, "counter hit");
                    return Ok(count);
                }
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "stored value is not a counter, treating as miss");
                }
            },
            Ok(None) => debug!(key = %cache_key, "counter miss"),
            Err(e) => {
                warn!(key = %cache_key, error = %e, "counter read failed, treating as miss");
            }
        }

        let count = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        if let Err(e) = backend
            .set(&cache_key, descriptor.expiration, value::encode_counter(count))
            .await
        {
            warn!(key = %cache_key, error = %e, "counter write-back failed");
        }
        Ok(count)
    }

    /// Run the wrapped operation and store its counter value afterward,
    /// best-effort. The count is returned unchanged.
    pub async fn update_counter<F, Fut, E>(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        loader: F,
    ) -> Result<u64>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<u64, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateCounter)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;

        let count = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        if let Err(e) = backend
            .set(&cache_key, descriptor.expiration, value::encode_counter(count))
            .await
        {
            warn!(key = %cache_key, error = %e, "counter write failed");
        }
        Ok(count)
    }
}
