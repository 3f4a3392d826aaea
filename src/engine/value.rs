//! Value transcoding at the backend boundary.
//!
//! Values are encoded with serde_json; a null is replaced by the sentinel
//! byte form before the write and translated back to `None` on read, so
//! the marker never reaches caller code.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheGateError, Result};
use crate::sentinel::NullSentinel;

/// Encode a possibly-null value for storage.
pub(crate) fn encode<V: Serialize>(value: Option<&V>) -> Result<Vec<u8>> {
    match value {
        Some(value) => serde_json::to_vec(value)
            .map_err(|e| CacheGateError::Serialization(e.to_string())),
        None => Ok(NullSentinel::encode()),
    }
}

/// Decode a raw cached value. The sentinel decodes to `None`.
pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<Option<V>> {
    if NullSentinel::matches(bytes) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| CacheGateError::Serialization(e.to_string()))
}

/// Counter values are ASCII decimal (the memcached counter convention).
pub(crate) fn encode_counter(value: u64) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Parse an ASCII decimal counter value.
pub(crate) fn decode_counter(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse::<u64>().ok())
        .ok_or_else(|| {
            CacheGateError::Serialization("cached value is not a counter".to_string())
        })
}
