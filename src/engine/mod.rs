//! The reconciliation engine.
//!
//! [`CacheGate`] is the decorator seam between a business operation and the
//! remote cache: callers wrap their data-access functions with the engine
//! method matching the operation's declared kind, and the engine derives
//! keys, consults the cache, invokes the wrapped operation when required,
//! and writes results back.
//!
//! Cache transport failures never become functional failures on read or
//! write-back paths: a failed read degrades to a full miss and a failed
//! write-back is logged and dropped. Only counter adjustments, whose
//! returned count the caller consumes, propagate backend errors.

mod counter;
mod invalidate;
mod read;
mod value;
mod write;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapAny;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::descriptor::{
    CacheDescriptor, DescriptorRegistry, OperationKind, DEFAULT_CACHE_NAME,
};
use crate::error::{CacheGateError, Result};
use crate::key::{self, KeyPart};
use crate::sentinel::NullSentinel;

/// Sized holder for the backend trait object. `ArcSwapAny` requires a
/// sized pointee, so the `dyn` reference lives one level down and is
/// cloned out on every load.
struct BackendSlot(Arc<dyn CacheBackend>);

type SwappableBackend = ArcSwapAny<Arc<BackendSlot>>;

/// Caching middleware engine over one or more named cache backends.
///
/// Construction validates that every registered descriptor references a
/// configured backend, so call-path lookups cannot fail on wiring.
/// Backends are held behind atomically swapped references: an
/// administrative [`swap_backend`](CacheGate::swap_backend) lets in-flight
/// operations finish against the old client while new operations start
/// against the new one, never a half-swapped state.
pub struct CacheGate {
    registry: Arc<DescriptorRegistry>,
    caches: HashMap<String, SwappableBackend>,
}

impl CacheGate {
    /// Start building an engine over the given registry.
    pub fn builder(registry: DescriptorRegistry) -> CacheGateBuilder {
        CacheGateBuilder {
            registry,
            caches: HashMap::new(),
        }
    }

    /// Replace the backend behind a cache name, returning the previous one.
    ///
    /// The caller is responsible for shutting the returned client down once
    /// nothing references it.
    pub fn swap_backend(
        &self,
        cache_name: &str,
        backend: Arc<dyn CacheBackend>,
    ) -> Result<Arc<dyn CacheBackend>> {
        let slot = self.caches.get(cache_name).ok_or_else(|| {
            CacheGateError::Config(format!("no cache instance named '{cache_name}'"))
        })?;
        let previous = slot.swap(Arc::new(BackendSlot(backend)));
        Ok(match Arc::try_unwrap(previous) {
            Ok(BackendSlot(backend)) => backend,
            Err(shared) => Arc::clone(&shared.0),
        })
    }

    /// Look up a descriptor and check it declares the expected kind.
    fn resolve(&self, operation: &str, kind: OperationKind) -> Result<Arc<CacheDescriptor>> {
        let descriptor = self.registry.get(operation)?;
        if descriptor.kind != kind {
            return Err(CacheGateError::Config(format!(
                "operation '{operation}' is declared as {} but was invoked as {kind}",
                descriptor.kind
            )));
        }
        Ok(Arc::clone(descriptor))
    }

    fn backend(&self, descriptor: &CacheDescriptor) -> Result<Arc<dyn CacheBackend>> {
        let slot = self.caches.get(&descriptor.cache_name).ok_or_else(|| {
            CacheGateError::Config(format!(
                "operation '{}' references unconfigured cache '{}'",
                descriptor.name, descriptor.cache_name
            ))
        })?;
        Ok(Arc::clone(&slot.load().0))
    }

    /// Fragments for the order-ranked fixed key parts of a call.
    fn fixed_fragments(parts: &[&dyn KeyPart]) -> Result<Vec<String>> {
        parts.iter().map(|part| key::generate_key(*part)).collect()
    }

    /// Derive the one key of a single or assign operation.
    fn derive_single_key(
        descriptor: &CacheDescriptor,
        parts: &[&dyn KeyPart],
    ) -> Result<String> {
        if let Some(assigned_key) = &descriptor.assigned_key {
            return key::build_assign_key(&descriptor.namespace, assigned_key);
        }
        if parts.len() != descriptor.key_indexes.len() {
            return Err(CacheGateError::InvalidArgument(format!(
                "operation '{}' declares {} key parameters but {} were supplied",
                descriptor.name,
                descriptor.key_indexes.len(),
                parts.len()
            )));
        }
        let fragments = Self::fixed_fragments(parts)?;
        key::build_key(&descriptor.namespace, &fragments)
    }

    /// Derive one key per id for a multi operation, substituting each id
    /// fragment into the declared list slot among the fixed parts.
    fn derive_multi_keys(
        descriptor: &CacheDescriptor,
        fixed_parts: &[&dyn KeyPart],
        id_fragments: &[String],
    ) -> Result<Vec<String>> {
        let list_slot = descriptor.list_index_in_keys.ok_or_else(|| {
            CacheGateError::Config(format!(
                "operation '{}' has no list slot resolved",
                descriptor.name
            ))
        })?;
        let expected_fixed = descriptor.key_indexes.len().saturating_sub(1);
        if fixed_parts.len() != expected_fixed {
            return Err(CacheGateError::InvalidArgument(format!(
                "operation '{}' declares {expected_fixed} fixed key parameters but {} were supplied",
                descriptor.name,
                fixed_parts.len()
            )));
        }
        let fixed_fragments = Self::fixed_fragments(fixed_parts)?;
        key::build_multi_keys(
            &descriptor.namespace,
            &fixed_fragments,
            list_slot,
            id_fragments,
        )
    }

    /// Best-effort write-back honoring the null-caching policy. A failed
    /// cache write never fails the overall operation.
    async fn write_back<V: Serialize + Sync>(
        &self,
        backend: &dyn CacheBackend,
        descriptor: &CacheDescriptor,
        cache_key: &str,
        value: Option<&V>,
    ) {
        if value.is_none() && !descriptor.policy.cache_nulls {
            debug!(key = cache_key, "null result not cached");
            return;
        }
        let bytes = match value::encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = cache_key, error = %e, "value could not be encoded, skipping write-back");
                return;
            }
        };
        if let Err(e) = backend.set(cache_key, descriptor.expiration, bytes).await {
            warn!(key = cache_key, error = %e, "cache write-back failed");
        } else {
            debug!(key = cache_key, "cache write-back");
        }
    }

    /// Unconditional sentinel write, used when the policy overwrites ids
    /// missing from a batch result.
    async fn write_null(
        &self,
        backend: &dyn CacheBackend,
        descriptor: &CacheDescriptor,
        cache_key: &str,
    ) {
        if let Err(e) = backend
            .set(cache_key, descriptor.expiration, NullSentinel::encode())
            .await
        {
            warn!(key = cache_key, error = %e, "sentinel write failed");
        }
    }
}

/// Builder wiring backends to a descriptor registry.
pub struct CacheGateBuilder {
    registry: DescriptorRegistry,
    caches: HashMap<String, Arc<dyn CacheBackend>>,
}

impl CacheGateBuilder {
    /// Set the default cache backend.
    pub fn backend(self, backend: Arc<dyn CacheBackend>) -> Self {
        self.named_backend(DEFAULT_CACHE_NAME, backend)
    }

    /// Add a named cache backend.
    pub fn named_backend(
        mut self,
        cache_name: impl Into<String>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        self.caches.insert(cache_name.into(), backend);
        self
    }

    /// Validate wiring and build the engine. Every descriptor must
    /// reference a configured cache instance.
    pub fn build(self) -> Result<CacheGate> {
        for descriptor in self.registry.descriptors() {
            if !self.caches.contains_key(&descriptor.cache_name) {
                return Err(CacheGateError::Config(format!(
                    "operation '{}' references unconfigured cache '{}'",
                    descriptor.name, descriptor.cache_name
                )));
            }
        }
        let caches = self
            .caches
            .into_iter()
            .map(|(name, backend)| {
                (name, SwappableBackend::new(Arc::new(BackendSlot(backend))))
            })
            .collect();
        Ok(CacheGate {
            registry: Arc::new(self.registry),
            caches,
        })
    }
}
