//! Error types for the cachegate library.
//!
//! Two error layers exist: [`CacheError`] is what a cache backend reports
//! (timeouts and transport failures), while [`CacheGateError`] is what the
//! engine surfaces to callers. Backend errors on read and write-back paths
//! are deliberately *not* part of the caller-visible surface; the engine
//! degrades to a cache miss or a skipped write instead.

use thiserror::Error;

/// Transport-level errors reported by a [`CacheBackend`](crate::CacheBackend).
///
/// A timeout is kept distinguishable from a generic transport failure so
/// operators can tell slow servers apart from broken ones in the logs.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache did not answer within the configured deadline.
    #[error("cache operation timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// Deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
        /// Short description of the operation that timed out.
        context: String,
    },

    /// Connection or protocol failure talking to the cache.
    #[error("cache transport error: {0}")]
    Transport(String),
}

/// Result alias for backend operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum CacheGateError {
    /// Static defect in an operation declaration. Raised once at descriptor
    /// or registry build time, never per call.
    #[error("configuration error: {0}")]
    Config(String),

    /// The named operation was never registered.
    #[error("unknown cache operation: {0}")]
    UnknownOperation(String),

    /// Invalid call-time input (null id in a batch, empty key fragment,
    /// empty id list). The call fails before any cache or loader work.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not cross the serialization boundary.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A batch loader returned results that cannot be reconciled with the
    /// requested ids.
    #[error("batch result mismatch: {0}")]
    ResultMismatch(String),

    /// The wrapped business operation itself failed.
    #[error("source operation failed: {0}")]
    Source(#[source] anyhow::Error),

    /// Backend error surfaced to the caller. Only counter adjustments
    /// propagate these; read and write paths degrade instead.
    #[error("cache backend error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, CacheGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Timeout {
            timeout_ms: 250,
            context: "bulk get".to_string(),
        };
        assert!(error.to_string().contains("timed out after 250ms"));

        let error = CacheGateError::UnknownOperation("get_widgets".to_string());
        assert_eq!(error.to_string(), "unknown cache operation: get_widgets");
    }

    #[test]
    fn test_backend_error_conversion() {
        let error: CacheGateError = CacheError::Transport("connection reset".to_string()).into();
        assert!(matches!(error, CacheGateError::Cache(_)));
    }
}
