use crep_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"crep-atom-v1"`, `"crep-commit-v1"`)
/// that is prepended to every hash computation. An atom and a commit whose
/// serialized bytes happen to coincide still hash differently.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for atoms: `(id, cause, value)`.
    pub const ATOM: Self = Self {
        domain: "crep-atom-v1",
    };
    /// Hasher for atom indexes: the sorted member atom hashes.
    pub const INDEX: Self = Self {
        domain: "crep-index-v1",
    };
    /// Hasher for commits: `(message, time, index, previous)`.
    pub const COMMIT: Self = Self {
        domain: "crep-commit-v1",
    };
    /// Hasher for reflog entries.
    pub const REFLOG: Self = Self {
        domain: "crep-reflog-v1",
    };
    /// Hasher for sitelog entries.
    pub const SITELOG: Self = Self {
        domain: "crep-sitelog-v1",
    };
    /// Hasher for branch settings records.
    pub const SETTINGS: Self = Self {
        domain: "crep-settings-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    ///
    /// `serde_json` maps are key-sorted, so equal values always produce the
    /// same bytes regardless of how they were built.
    pub fn hash_json<T: serde::Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<ObjectId, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Hash a sequence of object ids in the given order.
    pub fn hash_ids<'a>(&self, ids: impl IntoIterator<Item = &'a ObjectId>) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for id in ids {
            hasher.update(id.as_bytes());
        }
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
