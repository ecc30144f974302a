//! Index diff: compare two atom index snapshots.
//!
//! Entries are compared as `(key, hash)` pairs. An atom whose key survives
//! but whose hash changed shows up as a deletion of the old entry plus an
//! addition of the new one.

use std::collections::BTreeMap;

use crep_types::ObjectId;

use crate::index::AtomIndex;

/// Entries gained and lost going from one index to another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexDiff {
    /// Entries in the second index and not the first.
    pub additions: BTreeMap<String, ObjectId>,
    /// Entries in the first index and not the second.
    pub deletions: BTreeMap<String, ObjectId>,
}

impl IndexDiff {
    /// Returns `true` if the two indexes describe the same atoms.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Total number of changed entries.
    pub fn len(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }
}

/// Compute what changed between `first` and `second`.
///
/// Equal index hashes short-circuit to an empty diff without touching the
/// entries.
pub fn calculate_diff(first: &AtomIndex, second: &AtomIndex) -> IndexDiff {
    if first.hash == second.hash {
        return IndexDiff::default();
    }
    IndexDiff {
        additions: missing_from(&second.atoms, &first.atoms),
        deletions: missing_from(&first.atoms, &second.atoms),
    }
}

fn missing_from(
    source: &BTreeMap<String, ObjectId>,
    other: &BTreeMap<String, ObjectId>,
) -> BTreeMap<String, ObjectId> {
    source
        .iter()
        .filter(|(key, hash)| other.get(*key) != Some(*hash))
        .map(|(key, hash)| (key.clone(), *hash))
        .collect()
}
