use serde::{Deserialize, Serialize};
use serde_json::Value;

use crep_crypto::{ContentHasher, HasherError};
use crep_types::{AtomId, ObjectId};

/// The immutable unit of change in a causal tree.
///
/// `cause` is `None` only for the tree's single root. `hash` is
/// [`atom_hash`] over `(id, cause, value)`; a mismatch means the atom was
/// corrupted or tampered with in transit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom<T = Value> {
    pub id: AtomId,
    pub cause: Option<AtomId>,
    pub value: T,
    pub hash: ObjectId,
}

#[derive(Serialize)]
struct AtomHashInput<'a, T> {
    id: &'a AtomId,
    cause: Option<&'a AtomId>,
    value: &'a T,
}

/// Deterministic hash of an atom's identity, cause and payload.
pub fn atom_hash<T: Serialize>(
    id: &AtomId,
    cause: Option<&AtomId>,
    value: &T,
) -> Result<ObjectId, HasherError> {
    ContentHasher::ATOM.hash_json(&AtomHashInput { id, cause, value })
}

/// Build an atom attached to `cause` (or a root when `cause` is `None`).
pub fn atom<T: Serialize, C>(
    id: AtomId,
    cause: Option<&Atom<C>>,
    value: T,
) -> Result<Atom<T>, HasherError> {
    Atom::new(id, cause.map(|c| c.id.clone()), value)
}

/// Returns `true` if the atom's stored hash matches its contents.
pub fn atom_matches_checksum<T: Serialize>(atom: &Atom<T>) -> bool {
    match atom_hash(&atom.id, atom.cause.as_ref(), &atom.value) {
        Ok(hash) => hash == atom.hash,
        Err(_) => false,
    }
}

impl<T: Serialize> Atom<T> {
    pub fn new(id: AtomId, cause: Option<AtomId>, value: T) -> Result<Self, HasherError> {
        let hash = atom_hash(&id, cause.as_ref(), &value)?;
        Ok(Self {
            id,
            cause,
            value,
            hash,
        })
    }

    pub fn is_root(&self) -> bool {
        self.cause.is_none()
    }
}
