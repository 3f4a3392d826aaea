//! Cache key derivation.
//!
//! Keys are built in two stages: a [`KeyPart`] turns one business id into a
//! canonical string fragment, and the builder functions combine a namespace
//! with one or more fragments into a full cache key. The exact joining
//! behavior is a compatibility contract: independently deployed processes
//! sharing a cache must produce byte-identical keys for the same inputs.

pub mod builder;
pub mod provider;

pub use builder::{
    build_assign_key, build_key, build_keys, build_multi_keys, NAMESPACE_SEPARATOR, PART_SEPARATOR,
};
pub use provider::{generate_key, generate_keys, KeyPart};
