use crep_crypto::HasherError;

/// Errors from object construction and store operations.
///
/// A missing object or branch is never an error: lookups return `None`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be decoded.
    #[error("corrupt record at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A record could not be hashed.
    #[error("hash error: {0}")]
    Hash(#[from] HasherError),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
