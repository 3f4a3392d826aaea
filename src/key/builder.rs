//! Cache key construction from namespace and id fragments.

use crate::error::{CacheGateError, Result};
use crate::key::provider::{self, KeyPart};

/// Separator between the namespace and the key body.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Separator between parts of a composite key body.
pub const PART_SEPARATOR: char = '/';

fn require_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheGateError::InvalidArgument(
            "namespace must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Build one full cache key from a namespace and ordered id fragments.
///
/// A single fragment yields `namespace:part`; multiple fragments are joined
/// with [`PART_SEPARATOR`] in the given order. Every fragment must be
/// non-empty.
pub fn build_key(namespace: &str, parts: &[String]) -> Result<String> {
    require_namespace(namespace)?;
    if parts.is_empty() {
        return Err(CacheGateError::InvalidArgument(
            "at least one key part is required".to_string(),
        ));
    }
    if parts.iter().any(|part| part.is_empty()) {
        return Err(CacheGateError::InvalidArgument(
            "key parts must not be empty".to_string(),
        ));
    }

    let mut key = String::with_capacity(
        namespace.len() + 1 + parts.iter().map(|p| p.len() + 1).sum::<usize>(),
    );
    key.push_str(namespace);
    key.push(NAMESPACE_SEPARATOR);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(PART_SEPARATOR);
        }
        key.push_str(part);
    }
    Ok(key)
}

/// Build one independent single-part key per id, preserving input order.
///
/// `keys[i]` always corresponds to `ids[i]`; this is the batch variant used
/// by multi-key reads and writes.
pub fn build_keys<T: KeyPart>(namespace: &str, ids: &[T]) -> Result<Vec<String>> {
    require_namespace(namespace)?;
    let fragments = provider::generate_keys(ids)?;
    fragments
        .into_iter()
        .map(|fragment| build_key(namespace, &[fragment]))
        .collect()
}

/// Build a fixed key for assign-style operations with no per-call key
/// material.
pub fn build_assign_key(namespace: &str, assigned_key: &str) -> Result<String> {
    require_namespace(namespace)?;
    if assigned_key.is_empty() {
        return Err(CacheGateError::InvalidArgument(
            "assigned key must not be empty".to_string(),
        ));
    }
    build_key(namespace, &[assigned_key.to_string()])
}

/// Composite multi-key variant: one key per id fragment, substituting each
/// fragment into the list slot while the other order-ranked parts stay
/// fixed.
///
/// `list_slot` is the position of the list-typed slot among the full part
/// sequence, so it may be at most `fixed_parts.len()`.
pub fn build_multi_keys(
    namespace: &str,
    fixed_parts: &[String],
    list_slot: usize,
    id_fragments: &[String],
) -> Result<Vec<String>> {
    if list_slot > fixed_parts.len() {
        return Err(CacheGateError::Config(format!(
            "list slot {list_slot} is out of range for {} fixed key parts",
            fixed_parts.len()
        )));
    }

    id_fragments
        .iter()
        .map(|fragment| {
            let mut parts = Vec::with_capacity(fixed_parts.len() + 1);
            parts.extend_from_slice(&fixed_parts[..list_slot]);
            parts.push(fragment.clone());
            parts.extend_from_slice(&fixed_parts[list_slot..]);
            build_key(namespace, &parts)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_key() {
        let key = build_key("NS", &["101".to_string()]).unwrap();
        assert_eq!(key, "NS:101");
    }

    #[test]
    fn test_composite_key_joining() {
        let key = build_key(
            "orders",
            &["eu".to_string(), "2024".to_string(), "77".to_string()],
        )
        .unwrap();
        assert_eq!(key, "orders:eu/2024/77");
    }

    #[test]
    fn test_key_derivation_is_pure() {
        let parts = vec!["a".to_string(), "b".to_string()];
        let first = build_key("NS", &parts).unwrap();
        let second = build_key("NS", &parts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(build_key("", &["x".to_string()]).is_err());
        assert!(build_key("NS", &[]).is_err());
        assert!(build_key("NS", &["a".to_string(), String::new()]).is_err());
    }

    #[test]
    fn test_build_keys_preserves_order() {
        let keys = build_keys("NS", &[103u64, 101, 102]).unwrap();
        assert_eq!(keys, vec!["NS:103", "NS:101", "NS:102"]);
    }

    #[test]
    fn test_assign_key() {
        assert_eq!(build_assign_key("NS", "totals").unwrap(), "NS:totals");
        assert!(build_assign_key("NS", "").is_err());
    }

    #[test]
    fn test_multi_keys_substitute_list_slot() {
        let fixed = vec!["eu".to_string(), "2024".to_string()];
        let fragments = vec!["7".to_string(), "8".to_string()];

        let keys = build_multi_keys("orders", &fixed, 1, &fragments).unwrap();
        assert_eq!(keys, vec!["orders:eu/7/2024", "orders:eu/8/2024"]);

        let keys = build_multi_keys("orders", &fixed, 2, &fragments).unwrap();
        assert_eq!(keys, vec!["orders:eu/2024/7", "orders:eu/2024/8"]);
    }

    #[test]
    fn test_multi_keys_without_fixed_parts() {
        let keys = build_multi_keys("NS", &[], 0, &["101".to_string()]).unwrap();
        assert_eq!(keys, vec!["NS:101"]);
    }

    #[test]
    fn test_multi_keys_slot_out_of_range() {
        let err = build_multi_keys("NS", &["a".to_string()], 2, &["1".to_string()]).unwrap_err();
        assert!(matches!(err, CacheGateError::Config(_)));
    }
}
