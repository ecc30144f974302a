//! Error and rejection types for weave operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crep_crypto::HasherError;
use crep_types::AtomId;

use crate::atom::Atom;

/// Why the weave refused an atom.
///
/// `CauseNotFound` is transient: the same atom is expected to succeed once
/// its cause has been inserted. The other reasons are permanent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The stored hash does not match the recomputed one.
    ChecksumFailed,
    /// A root was offered to a weave that already has one.
    SecondRootNotAllowed,
    /// The atom's cause is not (yet) in the weave.
    CauseNotFound,
    /// Another atom already occupies this `(site, timestamp)` slot.
    ConflictingId,
    /// The atom's timestamp is not greater than its cause's.
    InvalidTimestamp,
}

impl RejectionReason {
    /// Returns `true` if re-offering the atom later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CauseNotFound)
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChecksumFailed => "checksum_failed",
            Self::SecondRootNotAllowed => "second_root_not_allowed",
            Self::CauseNotFound => "cause_not_found",
            Self::ConflictingId => "conflicting_id",
            Self::InvalidTimestamp => "invalid_timestamp",
        })
    }
}

/// A refused insertion. The atom is handed back so it can be retried.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomRejection<T> {
    pub reason: RejectionReason,
    pub atom: Atom<T>,
}

impl<T> fmt::Display for AtomRejection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom {} rejected: {}", self.atom.id, self.reason)
    }
}

impl<T: fmt::Debug> std::error::Error for AtomRejection<T> {}

/// Consistency faults in a weave.
///
/// Unlike rejections these indicate a corrupt or partially loaded weave, or
/// an internal bug, and are never expected during normal operation.
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// The requested atom is not in the weave.
    #[error("atom not found: {0}")]
    AtomNotFound(AtomId),

    /// An atom in the weave references a cause that is not present.
    #[error("atom {atom} references missing cause {cause}")]
    MissingCause { atom: AtomId, cause: AtomId },

    /// Re-importing a sub-weave refused an atom.
    #[error("sub-weave rejected atom {atom}: {reason}")]
    SubweaveRejected {
        atom: AtomId,
        reason: RejectionReason,
    },

    /// A structural invariant does not hold.
    #[error("invalid weave at atom {atom}: {reason}")]
    Invalid { atom: AtomId, reason: String },

    /// An atom could not be hashed.
    #[error("hash error: {0}")]
    Hash(#[from] HasherError),
}

/// Convenience alias for weave results.
pub type WeaveResult<T> = Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_display_as_wire_names() {
        assert_eq!(RejectionReason::ChecksumFailed.to_string(), "checksum_failed");
        assert_eq!(
            RejectionReason::SecondRootNotAllowed.to_string(),
            "second_root_not_allowed"
        );
        assert_eq!(RejectionReason::CauseNotFound.to_string(), "cause_not_found");
        assert_eq!(
            serde_json::to_string(&RejectionReason::ConflictingId).unwrap(),
            "\"conflicting_id\""
        );
        assert_eq!(
            RejectionReason::InvalidTimestamp.to_string(),
            "invalid_timestamp"
        );
    }

    #[test]
    fn only_missing_cause_is_retryable() {
        assert!(RejectionReason::CauseNotFound.is_retryable());
        assert!(!RejectionReason::ChecksumFailed.is_retryable());
        assert!(!RejectionReason::SecondRootNotAllowed.is_retryable());
        assert!(!RejectionReason::ConflictingId.is_retryable());
        assert!(!RejectionReason::InvalidTimestamp.is_retryable());
    }
}
