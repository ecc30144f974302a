use crep_types::ObjectId;

/// A record that participates in a hash chain (commits, in practice).
pub trait ChainLink {
    /// The hash stored on the record.
    fn link_hash(&self) -> ObjectId;
    /// The hash of the record this one extends (None for genesis).
    fn previous_hash(&self) -> Option<ObjectId>;
    /// The hash recomputed from the record's current contents.
    fn recompute_hash(&self) -> ObjectId;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of links, oldest first, forms a valid chain:
/// each link's previous hash matches the preceding link's hash, and each
/// link's stored hash matches the hash recomputed from its contents.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a complete chain that starts at genesis.
    pub fn verify_chain<L: ChainLink>(links: &[L]) -> Result<(), ChainError> {
        if let Some(first) = links.first() {
            if first.previous_hash().is_some() {
                return Err(ChainError::GenesisHasPrevHash);
            }
        }
        Self::verify_segment(links)
    }

    /// Verify a contiguous segment of a chain that need not start at genesis.
    pub fn verify_segment<L: ChainLink>(links: &[L]) -> Result<(), ChainError> {
        for (index, link) in links.iter().enumerate() {
            if link.recompute_hash() != link.link_hash() {
                return Err(ChainError::HashMismatch { index });
            }
            if index == 0 {
                continue;
            }
            let expected_prev = links[index - 1].link_hash();
            match link.previous_hash() {
                Some(prev) if prev == expected_prev => {}
                Some(_) => return Err(ChainError::BrokenLink { index }),
                None => return Err(ChainError::MissingPrevHash { index }),
            }
        }
        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis link has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("broken link at index {index}: previous hash does not match")]
    BrokenLink { index: usize },

    #[error("missing previous hash at index {index}")]
    MissingPrevHash { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },
}
