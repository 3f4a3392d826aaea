//! Invalidation operations.
//!
//! The wrapped operation always runs first; derived keys are deleted
//! afterward. Deletions are best-effort and independent of one another: a
//! failed delete is logged and risks a stale entry until natural TTL
//! expiry, which is an accepted tradeoff rather than an error the caller
//! must handle.

use std::future::Future;

use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::descriptor::OperationKind;
use crate::engine::CacheGate;
use crate::error::{CacheGateError, Result};
use crate::key::{self, KeyPart};

impl CacheGate {
    /// Run the wrapped operation, then delete the key derived from the
    /// call arguments.
    pub async fn invalidate_single<R, F, Fut, E>(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        loader: F,
    ) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::InvalidateSingle)?;
        if descriptor.key_from_result {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' takes its key from the result; use invalidate_single_by_result"
            )));
        }
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;

        let output = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        Self::delete_key(backend.as_ref(), &cache_key).await;
        Ok(output)
    }

    /// Run the wrapped operation, then delete the key derived from its
    /// result. Key-generation failure on the result fails the call.
    pub async fn invalidate_single_by_result<R, F, Fut, E>(
        &self,
        operation: &str,
        loader: F,
    ) -> Result<R>
    where
        R: KeyPart + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::InvalidateSingle)?;
        if !descriptor.key_from_result {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' takes its key from parameters; use invalidate_single"
            )));
        }

        let output = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let fragment = key::generate_key(&output)?;
        let cache_key = key::build_key(&descriptor.namespace, &[fragment])?;
        let backend = self.backend(&descriptor)?;
        Self::delete_key(backend.as_ref(), &cache_key).await;
        Ok(output)
    }

    /// Run the wrapped operation, then delete the fixed (assigned) key.
    pub async fn invalidate_assign<R, F, Fut, E>(&self, operation: &str, loader: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::InvalidateAssign)?;
        let cache_key = Self::derive_single_key(&descriptor, &[])?;

        let output = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        Self::delete_key(backend.as_ref(), &cache_key).await;
        Ok(output)
    }

    /// Run the wrapped operation, then delete one derived key per id.
    ///
    /// Keys are derived and validated before the operation runs. Deletes
    /// are issued per key so one failure does not stop the rest.
    pub async fn invalidate_multi<I, R, F, Fut, E>(
        &self,
        operation: &str,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
        loader: F,
    ) -> Result<R>
    where
        I: KeyPart + Clone,
        R: Send,
        F: FnOnce(Vec<I>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::InvalidateMulti)?;
        if ids.is_empty() {
            return loader(Vec::new())
                .await
                .map_err(|e| CacheGateError::Source(e.into()));
        }

        let id_fragments = key::generate_keys(ids)?;
        let keys = Self::derive_multi_keys(&descriptor, fixed_parts, &id_fragments)?;

        let output = loader(ids.to_vec())
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;

        let backend = self.backend(&descriptor)?;
        for cache_key in &keys {
            Self::delete_key(backend.as_ref(), cache_key).await;
        }
        Ok(output)
    }

    async fn delete_key(backend: &dyn CacheBackend, cache_key: &str) {
        match backend.delete(cache_key).await {
            Ok(()) => debug!(key = cache_key, "cache entry invalidated"),
            Err(e) => {
                warn!(key = cache_key, error = %e, "cache delete failed, entry stale until TTL expiry");
            }
        }
    }
}
