//! Write-through operations.
//!
//! The wrapped operation always runs first and is never skipped; the cache
//! is updated afterward, best-effort. Entry points differ by where the
//! stored value and the key material come from, mirroring the declared
//! [`DataSource`] and result-key flag; invoking the wrong entry point for
//! a declaration is a configuration error.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::descriptor::{CacheDescriptor, DataSource, OperationKind};
use crate::engine::CacheGate;
use crate::error::{CacheGateError, Result};
use crate::key::{self, KeyPart};

impl CacheGate {
    /// Write-through for a single-key operation whose result is the value
    /// to store. The loader's value is returned to the caller unchanged.
    pub async fn update_single<V, F, Fut, E>(
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
        let descriptor = self.resolve(operation, OperationKind::UpdateSingle)?;
        Self::require_data_source(&descriptor, DataSource::Result)?;
        if descriptor.key_from_result {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' takes its key from the result; use update_single_by_result"
            )));
        }
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;

        let produced = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        self.write_back(backend.as_ref(), &descriptor, &cache_key, produced.as_ref())
            .await;
        Ok(produced)
    }

    /// Write-through for a single-key operation whose value to store is a
    /// call argument. The loader still always runs first; its output is
    /// returned unchanged.
    pub async fn update_single_with<V, R, F, Fut, E>(
        &self,
        operation: &str,
        key_parts: &[&dyn KeyPart],
        data: Option<&V>,
        loader: F,
    ) -> Result<R>
    where
        V: Serialize + Send + Sync,
        R: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateSingle)?;
        Self::require_param_data_source(&descriptor)?;
        let cache_key = Self::derive_single_key(&descriptor, key_parts)?;

        let output = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        self.write_back(backend.as_ref(), &descriptor, &cache_key, data)
            .await;
        Ok(output)
    }

    /// Write-through where both the key material and the stored value come
    /// from the result. A null result leaves the cache untouched, since no
    /// key can be derived from it.
    pub async fn update_single_by_result<V, F, Fut, E>(
        &self,
        operation: &str,
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + KeyPart + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateSingle)?;
        Self::require_data_source(&descriptor, DataSource::Result)?;
        if !descriptor.key_from_result {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' takes its key from parameters; use update_single"
            )));
        }

        let produced = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        match &produced {
            Some(produced_value) => {
                let fragment = key::generate_key(produced_value)?;
                let cache_key = key::build_key(&descriptor.namespace, &[fragment])?;
                let backend = self.backend(&descriptor)?;
                self.write_back(
                    backend.as_ref(),
                    &descriptor,
                    &cache_key,
                    produced.as_ref(),
                )
                .await;
            }
            None => debug!(operation, "null result yields no key, cache untouched"),
        }
        Ok(produced)
    }

    /// Write-through against a fixed key; the result is the stored value.
    pub async fn update_assign<V, F, Fut, E>(
        &self,
        operation: &str,
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateAssign)?;
        Self::require_data_source(&descriptor, DataSource::Result)?;
        let cache_key = Self::derive_single_key(&descriptor, &[])?;

        let produced = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        self.write_back(backend.as_ref(), &descriptor, &cache_key, produced.as_ref())
            .await;
        Ok(produced)
    }

    /// Write-through against a fixed key with an argument-supplied value.
    pub async fn update_assign_with<V, R, F, Fut, E>(
        &self,
        operation: &str,
        data: Option<&V>,
        loader: F,
    ) -> Result<R>
    where
        V: Serialize + Send + Sync,
        R: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<R, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateAssign)?;
        Self::require_param_data_source(&descriptor)?;
        let cache_key = Self::derive_single_key(&descriptor, &[])?;

        let output = loader()
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        let backend = self.backend(&descriptor)?;
        self.write_back(backend.as_ref(), &descriptor, &cache_key, data)
            .await;
        Ok(output)
    }

    /// Batch write-through with positional result matching.
    ///
    /// Keys are derived and validated before the loader runs, so an
    /// invalid id fails the call without partial work. The loader always
    /// runs with the full id list and must return exactly one entry per
    /// id; each produced value is then written under its id's key, null
    /// entries following the null-caching policy. The loader's output is
    /// returned unchanged.
    pub async fn update_multi<I, V, F, Fut, E>(
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
        let descriptor = self.resolve(operation, OperationKind::UpdateMulti)?;
        Self::require_data_source(&descriptor, DataSource::Result)?;
        if descriptor.policy.match_by_result_key {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' declares keyed result matching; use update_multi_keyed"
            )));
        }
        if ids.is_empty() {
            let produced = loader(Vec::new())
                .await
                .map_err(|e| CacheGateError::Source(e.into()))?;
            return Ok(produced);
        }

        let keys = Self::derive_update_keys(&descriptor, fixed_parts, ids)?;

        let produced = loader(ids.to_vec())
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;
        if produced.len() != ids.len() {
            return Err(CacheGateError::ResultMismatch(format!(
                "operation '{operation}' loader returned {} results for {} ids",
                produced.len(),
                ids.len()
            )));
        }

        let backend = self.backend(&descriptor)?;
        for (cache_key, produced_value) in keys.iter().zip(&produced) {
            self.write_back(backend.as_ref(), &descriptor, cache_key, produced_value.as_ref())
                .await;
        }
        Ok(produced)
    }

    /// Batch write-through matching produced values to ids by each value's
    /// own key fragment. Ids absent from the produced values are either
    /// overwritten with the null sentinel or left untouched, per the
    /// declared policy.
    pub async fn update_multi_keyed<I, V, F, Fut, E>(
        &self,
        operation: &str,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
        loader: F,
    ) -> Result<Vec<V>>
    where
        I: KeyPart + Clone,
        V: Serialize + DeserializeOwned + KeyPart + Send + Sync,
        F: FnOnce(Vec<I>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<Vec<V>, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let descriptor = self.resolve(operation, OperationKind::UpdateMulti)?;
        Self::require_data_source(&descriptor, DataSource::Result)?;
        if !descriptor.policy.match_by_result_key {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' declares positional result matching; use update_multi"
            )));
        }
        if ids.is_empty() {
            return loader(Vec::new())
                .await
                .map_err(|e| CacheGateError::Source(e.into()));
        }

        let id_fragments = key::generate_keys(ids)?;
        let keys = Self::derive_multi_keys(&descriptor, fixed_parts, &id_fragments)?;

        let produced = loader(ids.to_vec())
            .await
            .map_err(|e| CacheGateError::Source(e.into()))?;

        // fail-fast: every produced value must yield a key fragment
        let mut produced_slots: std::collections::HashMap<String, usize> =
            std::collections::HashMap::with_capacity(produced.len());
        for (index, produced_value) in produced.iter().enumerate() {
            let fragment = key::generate_key(produced_value)?;
            produced_slots.insert(fragment, index);
        }

        let backend = self.backend(&descriptor)?;
        for (slot, fragment) in id_fragments.iter().enumerate() {
            match produced_slots.get(fragment) {
                Some(&index) => {
                    self.write_back(
                        backend.as_ref(),
                        &descriptor,
                        &keys[slot],
                        Some(&produced[index]),
                    )
                    .await;
                }
                None if descriptor.policy.overwrite_missing_with_null => {
                    self.write_null(backend.as_ref(), &descriptor, &keys[slot]).await;
                }
                None => debug!(key = %keys[slot], "no produced value, entry left untouched"),
            }
        }
        Ok(produced)
    }

    /// Multi-update keys, derived before the loader runs.
    fn derive_update_keys<I: KeyPart>(
        descriptor: &CacheDescriptor,
        fixed_parts: &[&dyn KeyPart],
        ids: &[I],
    ) -> Result<Vec<String>> {
        let id_fragments = key::generate_keys(ids)?;
        Self::derive_multi_keys(descriptor, fixed_parts, &id_fragments)
    }

    fn require_data_source(descriptor: &CacheDescriptor, expected: DataSource) -> Result<()> {
        if descriptor.data_source != expected {
            return Err(CacheGateError::Config(format!(
                "operation '{}' declares data source {:?}, not {:?}",
                descriptor.name, descriptor.data_source, expected
            )));
        }
        Ok(())
    }

    fn require_param_data_source(descriptor: &CacheDescriptor) -> Result<()> {
        if !matches!(descriptor.data_source, DataSource::Param(_)) {
            return Err(CacheGateError::Config(format!(
                "operation '{}' declares data source {:?}, expected a parameter",
                descriptor.name, descriptor.data_source
            )));
        }
        Ok(())
    }
}
