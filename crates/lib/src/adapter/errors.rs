//! Structured error types for adapter operations.

use thiserror::Error;

/// Errors surfaced by storage/sync adapters.
///
/// The engine does not retry failed adapter operations; a failed `set` fails
/// the enclosing `put`, and retry policy, if any, belongs to the adapter or
/// its caller.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter could not persist or read its backing store.
    #[error("storage error in adapter '{adapter}': {reason}")]
    Storage { adapter: String, reason: String },

    /// The adapter's on-disk or on-wire representation could not be decoded.
    #[error("corrupt data in adapter '{adapter}': {reason}")]
    CorruptData { adapter: String, reason: String },
}

impl AdapterError {
    /// Check if this error is related to the backing store.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, AdapterError::Storage { .. })
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, AdapterError::CorruptData { .. })
    }
}

impl From<AdapterError> for crate::Error {
    fn from(err: AdapterError) -> Self {
        crate::Error::Adapter(err)
    }
}
