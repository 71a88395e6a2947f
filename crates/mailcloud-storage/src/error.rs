//! Storage-facing error taxonomy.

/// Errors raised by [`crate::MongoStorage`]. Every variant maps to
/// `mailcloud_core::PipelineError::TransientUpstream` at the worker
/// boundary — a storage failure always drives the worker's retry/
/// dead-letter state machine, never a permanent rejection.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("mongodb operation failed: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("failed to serialize event as a document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("failed to decode a stored document: {0}")]
    Decode(#[from] bson::de::Error),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
