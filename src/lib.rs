//! # cachegate
//!
//! Declarative read-through / write-through / invalidate caching middleware
//! for remote key-value caches.
//!
//! The library sits between a typed business operation and a dumb
//! key-value cache: each cached operation is described once by a
//! [`CacheDescriptor`], and the [`CacheGate`] engine derives cache keys
//! from the call's arguments, consults the cache, invokes the wrapped
//! operation only when required, and reconciles cache hits with freshly
//! computed values into one ordered result.
//!
//! ## Features
//!
//! - **Deterministic key derivation**: namespace plus order-ranked key
//!   fragments, byte-identical across processes sharing a cache
//! - **Batch reconciliation**: one bulk lookup per multi-key call, the
//!   wrapped operation invoked only for the missed ids, results merged in
//!   input order
//! - **Null sentinel**: deliberately cached nulls stay distinguishable
//!   from cache misses and never leak to callers
//! - **Degraded-mode reads**: cache transport failures become full misses,
//!   never functional failures
//! - **Swappable backends**: named cache instances behind atomically
//!   swapped references
//!
//! ## Example
//!
//! ```rust
//! use cachegate::{
//!     CacheGate, DescriptorBuilder, DescriptorRegistry, MemoryBackend, MethodSpec,
//!     OperationKind, ParamSpec,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = DescriptorRegistry::builder()
//!     .register(
//!         DescriptorBuilder::new("users.read", OperationKind::ReadMulti)
//!             .namespace("users")
//!             .expiration(Duration::from_secs(300))
//!             .signature(MethodSpec::new("get_users").param(ParamSpec::new("ids").key_order(0).list()))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let gate = CacheGate::builder(registry)
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .build()?;
//!
//! // Only the ids missing from cache reach the loader.
//! let names: Vec<Option<String>> = gate
//!     .read_multi("users.read", &[], &[101u64, 102, 103], |missing| async move {
//!         Ok::<_, anyhow::Error>(missing.iter().map(|id| Some(format!("user-{id}"))).collect())
//!     })
//!     .await?;
//! assert_eq!(names.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod key;
pub mod sentinel;

// Re-export main types for convenience
pub use backend::{CacheBackend, MemoryBackend};
pub use descriptor::{
    CacheDescriptor, CachePolicy, DataSource, DescriptorBuilder, DescriptorRegistry, MethodSpec,
    OperationKind, ParamSpec, RegistryBuilder, DEFAULT_CACHE_NAME,
};
pub use engine::{CacheGate, CacheGateBuilder};
pub use error::{CacheError, CacheGateError, CacheResult, Result};
pub use key::{
    generate_key, generate_keys, KeyPart, NAMESPACE_SEPARATOR, PART_SEPARATOR,
};
pub use sentinel::NullSentinel;
