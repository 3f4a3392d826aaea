//! Key fragment generation for business identifiers.
//!
//! Types bind their canonical key form directly through [`KeyPart`] rather
//! than any runtime method discovery; primitive and string types come
//! pre-bound via their `Display` form. `Option<T>` models a nullable id:
//! `None` produces an empty fragment, which [`generate_key`] rejects.

use crate::error::{CacheGateError, Result};

/// A business identifier that can contribute one fragment of a cache key.
///
/// The produced string must be non-empty and stable across processes
/// sharing the same cache. Implementations are `Send + Sync` so engine
/// futures stay spawnable.
pub trait KeyPart: Send + Sync {
    /// Canonical string form of this id.
    fn key_part(&self) -> String;
}

macro_rules! display_key_part {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyPart for $t {
                fn key_part(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_key_part!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char);

impl KeyPart for String {
    fn key_part(&self) -> String {
        self.clone()
    }
}

impl KeyPart for str {
    fn key_part(&self) -> String {
        self.to_owned()
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn key_part(&self) -> String {
        (**self).key_part()
    }
}

/// A missing id has no fragment; `generate_key` turns that into an
/// argument-validation failure instead of a silent skip.
impl<T: KeyPart> KeyPart for Option<T> {
    fn key_part(&self) -> String {
        match self {
            Some(id) => id.key_part(),
            None => String::new(),
        }
    }
}

/// Produce the key fragment for a single id.
///
/// Fails with [`CacheGateError::InvalidArgument`] when the id yields an
/// empty fragment (including a `None` id).
pub fn generate_key<T: KeyPart + ?Sized>(id: &T) -> Result<String> {
    let part = id.key_part();
    if part.is_empty() {
        return Err(CacheGateError::InvalidArgument(
            "id produced an empty key fragment".to_string(),
        ));
    }
    Ok(part)
}

/// Produce key fragments for a batch of ids, element-wise.
///
/// An empty batch is an argument-validation failure, as is any id that
/// yields an empty fragment. No partial result is ever returned.
pub fn generate_keys<T: KeyPart>(ids: &[T]) -> Result<Vec<String>> {
    if ids.is_empty() {
        return Err(CacheGateError::InvalidArgument(
            "cannot generate keys for an empty id list".to_string(),
        ));
    }
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            generate_key(id).map_err(|_| {
                CacheGateError::InvalidArgument(format!(
                    "id at position {i} produced an empty key fragment"
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_fragments() {
        assert_eq!(generate_key(&42u64).unwrap(), "42");
        assert_eq!(generate_key(&-7i32).unwrap(), "-7");
        assert_eq!(generate_key("user-9").unwrap(), "user-9");
        assert_eq!(generate_key(&true).unwrap(), "true");
    }

    #[test]
    fn test_empty_fragment_rejected() {
        let err = generate_key("").unwrap_err();
        assert!(matches!(err, CacheGateError::InvalidArgument(_)));
    }

    #[test]
    fn test_none_id_rejected() {
        let id: Option<u64> = None;
        let err = generate_key(&id).unwrap_err();
        assert!(matches!(err, CacheGateError::InvalidArgument(_)));

        assert_eq!(generate_key(&Some(101u64)).unwrap(), "101");
    }

    #[test]
    fn test_generate_keys_element_wise() {
        let keys = generate_keys(&[101u64, 102, 103]).unwrap();
        assert_eq!(keys, vec!["101", "102", "103"]);
    }

    #[test]
    fn test_empty_list_rejected() {
        let ids: [u64; 0] = [];
        let err = generate_keys(&ids).unwrap_err();
        assert!(matches!(err, CacheGateError::InvalidArgument(_)));
    }

    #[test]
    fn test_null_element_rejected_with_position() {
        let ids = [Some(1u64), None, Some(3)];
        let err = generate_keys(&ids).unwrap_err();
        match err {
            CacheGateError::InvalidArgument(msg) => assert!(msg.contains("position 1")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
