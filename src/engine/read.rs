//! Read-through operations.
//!
//! The cache is consulted first; the wrapped operation runs only for keys
//! the cache could not serve. A cached null (the sentinel) counts as a hit
//! and short-circuits the loader just like a real value.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::descriptor::{CacheDescriptor, OperationKind};
use crate::engine::{value, CacheGate};
use crate::error::{CacheGateError, Result};
use crate::key::{self, KeyPart};

/// Outcome of the bulk-lookup phase of a multi read. `slots[i]` mirrors
/// `ids[i]`: `Some(hit)` for keys the cache served (including cached
/// nulls), `None` for misses still to be resolved.
struct MultiPartition<V> {
    keys: Vec<String>,
    id_fragments: Vec<String>,
    slots: Vec<Option<Option<V>>>,
    miss_positions: Vec<usize>,
}

impl CacheGate {
    /// Read-through for a single-key operation.
    ///
    /// `key_parts` supply the order-ranked key material. The loader runs
    /// only on a cache miss; its result (or null, when null-caching is
    /// enabled) is written back with the declared TTL.
    pub async fn read_single<V, F, Fut, E>(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::ReadSingle)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;
        self.read_through_single(&descriptor, cache_key, loader).await
    }

    /// Read-through against a fixed (assigned) key.
    pub async fn read_assign<V, F, Fut, E>(&self, operation: &str, loader: F) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::ReadAssign)?;
        let cache_key = Self::derive_single_key(&descriptor, &[])?;
        self.read_through_single(&descriptor, cache_key, loader).await
    }

    /// Batch read-through with positional result matching.
    ///
    /// One key is derived per id, preserving input order; a single bulk
    /// lookup partitions ids into hits and misses, and the loader runs
    /// once with only the missed ids (relative order preserved). It must
    /// return exactly one entry per requested id, `None` standing for a
    /// null result. The returned list matches the input order; when the
    /// policy skips nulls in the result, null entries are dropped instead.
    pub async fn read_multi<I, V, F, Fut, E>(
        &self,
        operation: &str,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
        loader: F,
    ) -> Result<Vec<Option<V>>>
    where
        I: KeyPart + Clone,
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(Vec<I>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Vec<Option<V>>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::ReadMulti)?;
        if descriptor.policy.match_by_result_key {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' declares keyed result matching; use read_multi_keyed"
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (backend, mut partition) = self.partition_multi(&descriptor, fixed_parts, ids).await?;

        if !partition.miss_positions.is_empty() {
            let miss_ids: Vec<I> = partition
                .miss_positions
                .iter()
                .map(|&slot| ids[slot].clone())
                .collect();
            debug!(
                operation,
                hits = ids.len() - miss_ids.len(),
                misses = miss_ids.len(),
                "partial cache hit"
            );

            let loaded = loader(miss_ids)
                .await
                .map_err(|e| CacheGateError::Source(e.into()))?;
            if loaded.len() != partition.miss_positions.len() {
                return Err(CacheGateError::ResultMismatch(format!(
                    "operation '{operation}' loader returned {} results for {} missed ids",
                    loaded.len(),
                    partition.miss_positions.len()
                )));
            }

            for (&slot, loaded_value) in partition.miss_positions.iter().zip(loaded) {
                self.write_back(
                    backend.as_ref(),
                    &descriptor,
                    &partition.keys[slot],
                    loaded_value.as_ref(),
                )
                .await;
                partition.slots[slot] = Some(loaded_value);
            }
        }

        Ok(Self::assemble(&descriptor, partition.slots))
    }

    /// Batch read-through matching loader results to ids by each result's
    /// own key fragment instead of position.
    ///
    /// Needed when the operation may return fewer results than requested
    /// ids (soft-deleted entries, for example). A result that fails key
    /// generation invalidates the entire batch, since partial success
    /// cannot be reported through this mechanism. Ids the loader did not
    /// produce stay absent from cache unless null-caching writes the
    /// sentinel for them.
    pub async fn read_multi_keyed<I, V, F, Fut, E>(
        &self,
        operation: &str,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
        loader: F,
    ) -> Result<Vec<Option<V>>>
    where
        I: KeyPart + Clone,
        V: Serialize + DeserializeOwned + KeyPart + Send + Sync,
        F: FnOnce(Vec<I>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Vec<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::ReadMulti)?;
        if !descriptor.policy.match_by_result_key {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' declares positional result matching; use read_multi"
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (backend, mut partition) = self.partition_multi(&descriptor, fixed_parts, ids).await?;

        if !partition.miss_positions.is_empty() {
            let miss_ids: Vec<I> = partition
                .miss_positions
                .iter()
                .map(|&slot| ids[slot].clone())
                .collect();

            let loaded = loader(miss_ids)
                .await
                .map_err(|e| CacheGateError::Source(e.into()))?;

            let mut by_fragment: HashMap<String, V> = HashMap::with_capacity(loaded.len());
            for loaded_value in loaded {
                let fragment = key::generate_key(&loaded_value)?;
                by_fragment.insert(fragment, loaded_value);
            }

            for &slot in &partition.miss_positions {
                let loaded_value = by_fragment.remove(&partition.id_fragments[slot]);
                self.write_back(
                    backend.as_ref(),
                    &descriptor,
                    &partition.keys[slot],
                    loaded_value.as_ref(),
                )
                .await;
                partition.slots[slot] = Some(loaded_value);
            }
        }

        Ok(Self::assemble(&descriptor, partition.slots))
    }

    /// Shared single-key read-through body.
    async fn read_through_single<V, F, Fut, E>(
        &self,
        descriptor: &CacheDescriptor,
        cache_key: String,
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let backend = self.backend(descriptor)?;
        match backend.get(&cache_key).await {
            Ok(Some(bytes)) => match value::decode::<V>(&bytes) {
                Ok(hit) => {
                    debug!(key = %cache_key, "cache hit");
                    return Ok(hit);
                }
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "undecodable cache entry, treating as miss");
                }
            },
            Ok(None) => debug!(key = %cache_key, "cache miss"),
            Err(e) => {
                warn!(key = %cache_key, error = %e, "cache read failed, treating as miss");
            }
        }

        let loaded = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        self.write_back(backend.as_ref(), descriptor, &cache_key, loaded.as_ref())
            .await;
        Ok(loaded)
    }

    /// Derive keys, issue the bulk lookup, and partition ids into hits and
    /// misses. A failed bulk lookup degrades to all-miss.
    async fn partition_multi<I, V>(
        &self,
        descriptor: &CacheDescriptor,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
    ) -> Result<(Arc<dyn CacheBackend>, MultiPartition<V>)>
    where
        I: KeyPart,
        V: DeserializeOwned,
    {
        let id_fragments = key::generate_keys(ids)?;
        let keys = Self::derive_multi_keys(descriptor, fixed_parts, &id_fragments)?;
        let backend = self.backend(descriptor)?;

        let cached = match backend.get_bulk(&keys).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    operation = %descriptor.name,
                    error = %e,
                    "bulk cache read failed, treating all keys as misses"
                );
                HashMap::new()
            }
        };

        let mut slots = Vec::with_capacity(keys.len());
        let mut miss_positions = Vec::new();
        for (slot, cache_key) in keys.iter().enumerate() {
            if let Some(bytes) = cached.get(cache_key) {
                match value::decode::<V>(bytes) {
                    Ok(hit) => {
                        slots.push(Some(hit));
                        continue;
                    }
                    Err(e) => {
                        warn!(key = %cache_key, error = %e, "undecodable cache entry, treating as miss");
                    }
                }
            }
            slots.push(None);
            miss_positions.push(slot);
        }

        Ok((
            backend,
            MultiPartition {
                keys,
                id_fragments,
                slots,
                miss_positions,
            },
        ))
    }

    /// Collapse resolved slots into the final ordered result, applying the
    /// skip-nulls policy. Every slot has been resolved by this point; an
    /// unresolved slot collapses to null rather than panicking.
    fn assemble<V>(descriptor: &CacheDescriptor, slots: Vec<Option<Option<V>>>) -> Vec<Option<V>> {
        let mut results: Vec<Option<V>> = slots.into_iter().map(|slot| slot.unwrap_or(None)).collect();
        if descriptor.policy.skip_nulls_in_result {
            results.retain(|entry| entry.is_some());
        }
        results
    }
}
