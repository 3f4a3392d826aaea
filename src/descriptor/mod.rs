//! Static descriptors for cached operations.
//!
//! Every wrapped business operation is described once, at startup, by a
//! [`CacheDescriptor`]: which cache it targets, how its arguments (or its
//! result) supply key material, where the value to store comes from, and
//! how long entries live. Descriptors are produced by an ordered build
//! pipeline from an explicit declaration and collected into an immutable
//! [`DescriptorRegistry`]; any validation failure is a fatal configuration
//! error raised at build time, never per call.

pub mod builder;
pub mod registry;

pub use builder::{DescriptorBuilder, MethodSpec, ParamSpec};
pub use registry::{DescriptorRegistry, RegistryBuilder};

use std::fmt;
use std::time::Duration;

/// Cache instance used when a descriptor names none.
pub const DEFAULT_CACHE_NAME: &str = "default";

/// The reconciliation strategy a cached operation follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Cache consulted first; on miss the operation runs and its result is
    /// cached.
    ReadSingle,
    /// Bulk read-through over a list of ids.
    ReadMulti,
    /// Read-through against a fixed key with no per-call key material.
    ReadAssign,
    /// Operation always runs; its value is written to cache afterward.
    UpdateSingle,
    /// Operation always runs; one value per id is written afterward.
    UpdateMulti,
    /// Write-through against a fixed key.
    UpdateAssign,
    /// Operation always runs; the derived key is deleted afterward.
    InvalidateSingle,
    /// Operation always runs; one key per id is deleted afterward.
    InvalidateMulti,
    /// Invalidation of a fixed key.
    InvalidateAssign,
    /// Counter increment.
    Increment,
    /// Counter decrement.
    Decrement,
    /// Read a counter value, computing and storing it on miss.
    ReadCounter,
    /// Operation always runs; its counter value is stored afterward.
    UpdateCounter,
}

impl OperationKind {
    /// Read-through kinds, where a cache hit short-circuits the operation.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            OperationKind::ReadSingle
                | OperationKind::ReadMulti
                | OperationKind::ReadAssign
                | OperationKind::ReadCounter
        )
    }

    /// Write-through kinds.
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            OperationKind::UpdateSingle
                | OperationKind::UpdateMulti
                | OperationKind::UpdateAssign
                | OperationKind::UpdateCounter
        )
    }

    /// Invalidation kinds.
    pub fn is_invalidate(&self) -> bool {
        matches!(
            self,
            OperationKind::InvalidateSingle
                | OperationKind::InvalidateMulti
                | OperationKind::InvalidateAssign
        )
    }

    /// Kinds spanning N ids with one key each.
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            OperationKind::ReadMulti | OperationKind::UpdateMulti | OperationKind::InvalidateMulti
        )
    }

    /// Fixed-key kinds with no per-call key material.
    pub fn is_assign(&self) -> bool {
        matches!(
            self,
            OperationKind::ReadAssign | OperationKind::UpdateAssign | OperationKind::InvalidateAssign
        )
    }

    /// Counter kinds (values stored as ASCII decimal).
    pub fn is_counter(&self) -> bool {
        matches!(
            self,
            OperationKind::Increment
                | OperationKind::Decrement
                | OperationKind::ReadCounter
                | OperationKind::UpdateCounter
        )
    }

    /// Whether the declaration must mark key parameters. Assign kinds take
    /// their key from the descriptor instead.
    pub fn uses_key_indexes(&self) -> bool {
        !self.is_assign()
    }

    /// Whether the descriptor carries a value to store.
    pub fn uses_data(&self) -> bool {
        self.is_update()
    }

    /// Invalidations and counter adjustments never read an expiration.
    pub fn uses_expiration(&self) -> bool {
        !self.is_invalidate()
            && !matches!(self, OperationKind::Increment | OperationKind::Decrement)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::ReadSingle => "read_single",
            OperationKind::ReadMulti => "read_multi",
            OperationKind::ReadAssign => "read_assign",
            OperationKind::UpdateSingle => "update_single",
            OperationKind::UpdateMulti => "update_multi",
            OperationKind::UpdateAssign => "update_assign",
            OperationKind::InvalidateSingle => "invalidate_single",
            OperationKind::InvalidateMulti => "invalidate_multi",
            OperationKind::InvalidateAssign => "invalidate_assign",
            OperationKind::Increment => "increment",
            OperationKind::Decrement => "decrement",
            OperationKind::ReadCounter => "read_counter",
            OperationKind::UpdateCounter => "update_counter",
        };
        write!(f, "{name}")
    }
}

/// Where the value to store comes from for write-through kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSource {
    /// No value is stored (reads, invalidations, counter adjustments).
    #[default]
    None,
    /// The parameter at this position holds the value.
    Param(usize),
    /// The operation's return value holds the value.
    Result,
}

/// Per-operation null and batch-matching behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// Match batch results back to ids by each result's own key fragment
    /// instead of positional correspondence. Needed when the operation may
    /// return fewer results than requested ids.
    pub match_by_result_key: bool,

    /// Write the null sentinel for null results so a later read serves the
    /// cached null instead of re-invoking the operation. Off by default:
    /// a null result stays a cache miss.
    pub cache_nulls: bool,

    /// Drop null entries from a multi-read result instead of representing
    /// them as `None`.
    pub skip_nulls_in_result: bool,

    /// For keyed multi-updates: ids absent from the produced results are
    /// overwritten with the null sentinel unconditionally instead of being
    /// left untouched.
    pub overwrite_missing_with_null: bool,
}

/// Immutable-after-build descriptor for one cached operation.
///
/// Built once by [`DescriptorBuilder`] and shared for the lifetime of the
/// process through a [`DescriptorRegistry`].
#[derive(Debug, Clone)]
pub struct CacheDescriptor {
    /// Operation name, unique within a registry.
    pub name: String,

    /// Reconciliation strategy.
    pub kind: OperationKind,

    /// Required non-empty prefix scoping all keys for this operation.
    pub namespace: String,

    /// Which cache instance to use.
    pub cache_name: String,

    /// Positions of parameters supplying key material, in declared order
    /// rank. Empty when the key comes from the result or from an assigned
    /// key.
    pub key_indexes: Vec<usize>,

    /// Key material comes from the operation's result instead of its
    /// parameters. Only legal for non-read kinds, since read-through keys
    /// must be known before invocation.
    pub key_from_result: bool,

    /// Where the value to store comes from.
    pub data_source: DataSource,

    /// For multi kinds: position of the list-typed slot within
    /// `key_indexes`.
    pub list_index_in_keys: Option<usize>,

    /// For multi kinds: position of the list-typed parameter within the
    /// declared parameter list.
    pub list_index_in_args: Option<usize>,

    /// Entry time-to-live. `Duration::ZERO` means no expiry; kinds exempt
    /// from expiration keep the zero default.
    pub expiration: Duration,

    /// Fixed key suffix for assign kinds.
    pub assigned_key: Option<String>,

    /// Null and batch-matching behavior.
    pub policy: CachePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(OperationKind::ReadMulti.is_read());
        assert!(OperationKind::ReadMulti.is_multi());
        assert!(!OperationKind::ReadMulti.is_assign());

        assert!(OperationKind::UpdateAssign.is_update());
        assert!(OperationKind::UpdateAssign.is_assign());
        assert!(!OperationKind::UpdateAssign.uses_key_indexes());

        assert!(OperationKind::InvalidateMulti.is_invalidate());
        assert!(!OperationKind::InvalidateMulti.uses_expiration());

        assert!(OperationKind::Increment.is_counter());
        assert!(!OperationKind::Increment.uses_expiration());
        assert!(OperationKind::ReadCounter.uses_expiration());
        assert!(OperationKind::UpdateCounter.uses_data());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(OperationKind::ReadMulti.to_string(), "read_multi");
        assert_eq!(
            OperationKind::InvalidateAssign.to_string(),
            "invalidate_assign"
        );
    }
}
