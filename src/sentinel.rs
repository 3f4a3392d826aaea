//! Null-sentinel handling.
//!
//! A cache miss and a deliberately cached null must stay distinguishable:
//! when null caching is enabled, the engine writes a canonical marker in
//! place of the missing value and translates it back to `None` on read.
//! The marker never leaks to caller code.

/// Canonical byte form of a cached null.
///
/// The leading and trailing NUL bytes make this invalid JSON, so it can
/// never collide with an engine-encoded value. Processes sharing a cache
/// must agree on these exact bytes.
const SENTINEL_BYTES: &[u8] = b"\0cachegate:null\0";

/// Marker value written to cache in place of an actual null.
///
/// Any two instances are equal; the type carries no state and is used as a
/// tag only. Decoding the canonical bytes yields a value equal to
/// [`NullSentinel`] under `PartialEq`, not reference identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NullSentinel;

impl NullSentinel {
    /// Byte form written through the backend `set` call.
    pub fn encode() -> Vec<u8> {
        SENTINEL_BYTES.to_vec()
    }

    /// Whether a raw cached value is the null marker.
    pub fn matches(bytes: &[u8]) -> bool {
        bytes == SENTINEL_BYTES
    }

    /// Round-trip a raw cached value back into the marker, if it is one.
    pub fn decode(bytes: &[u8]) -> Option<NullSentinel> {
        Self::matches(bytes).then_some(NullSentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_round_trip() {
        let encoded = NullSentinel::encode();
        let decoded = NullSentinel::decode(&encoded);
        assert_eq!(decoded, Some(NullSentinel));
    }

    #[test]
    fn test_decoded_instances_equal_singleton() {
        let a = NullSentinel::decode(&NullSentinel::encode()).unwrap();
        let b = NullSentinel;
        assert_eq!(a, b);
    }

    #[test]
    fn test_sentinel_never_valid_json() {
        let encoded = NullSentinel::encode();
        assert!(serde_json::from_slice::<serde_json::Value>(&encoded).is_err());
    }

    #[test]
    fn test_non_sentinel_bytes_rejected() {
        assert_eq!(NullSentinel::decode(b"null"), None);
        assert_eq!(NullSentinel::decode(b""), None);
        assert!(!NullSentinel::matches(br#""cachegate:null""#));
    }
}
