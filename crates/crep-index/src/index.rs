use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crep_crypto::ContentHasher;
use crep_types::ObjectId;
use crep_weave::Atom;

/// A content-addressed snapshot of a weave's atom set.
///
/// `atoms` maps each atom's key (`"site@timestamp"`) to its hash. `hash` is
/// the index hash of the member hashes, sorted, so the order atoms were
/// added in never affects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomIndex {
    pub hash: ObjectId,
    pub atoms: BTreeMap<String, ObjectId>,
}

impl AtomIndex {
    /// Build an index from `key -> atom hash` entries.
    pub fn from_entries(atoms: BTreeMap<String, ObjectId>) -> Self {
        let hash = rolled_up_hash(&atoms);
        Self { hash, atoms }
    }

    /// An index with no atoms.
    pub fn empty() -> Self {
        Self::from_entries(BTreeMap::new())
    }

    /// Number of atoms in the index.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Returns `true` if the index has no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// The hash recorded for the atom with this key.
    pub fn get(&self, key: &str) -> Option<&ObjectId> {
        self.atoms.get(key)
    }

    /// Returns `true` if the index holds an atom with this hash.
    pub fn contains_hash(&self, hash: &ObjectId) -> bool {
        self.atoms.values().any(|h| h == hash)
    }

    /// Returns `true` if `hash` matches the member set.
    ///
    /// Indexes decoded from storage or the wire should be checked before
    /// their hash is trusted for equality shortcuts.
    pub fn verify(&self) -> bool {
        rolled_up_hash(&self.atoms) == self.hash
    }
}

/// Snapshot a set of atoms into an index.
///
/// Atoms sharing a key collapse to the last one given.
pub fn create_index<'a, T: 'a>(atoms: impl IntoIterator<Item = &'a Atom<T>>) -> AtomIndex {
    let entries = atoms
        .into_iter()
        .map(|atom| (atom.id.key(), atom.hash))
        .collect();
    AtomIndex::from_entries(entries)
}

fn rolled_up_hash(atoms: &BTreeMap<String, ObjectId>) -> ObjectId {
    let mut hashes: Vec<&ObjectId> = atoms.values().collect();
    hashes.sort();
    ContentHasher::INDEX.hash_ids(hashes)
}
