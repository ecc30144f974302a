//! Unacknowledged atom bookkeeping for one branch.

use std::collections::{BTreeMap, HashMap};

use crep_protocol::AddAtomsEvent;
use crep_types::ObjectId;
use crep_weave::Atom;

/// Atoms (and removals) sent to a branch but not yet acknowledged.
///
/// Entries keep the order they were recorded in so a resend replays them
/// as originally sent. A removal is a tombstone keyed by the removed hash;
/// recording a hash again replaces its earlier entry and moves it to the
/// back. Entries leave only through [`PendingAtoms::acknowledge`].
#[derive(Clone, Debug, Default)]
pub struct PendingAtoms {
    next_seq: u64,
    order: BTreeMap<u64, (ObjectId, Option<Atom>)>,
    by_hash: HashMap<ObjectId, u64>,
}

impl PendingAtoms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an atom about to be sent.
    pub fn record_added(&mut self, atom: Atom) {
        self.record(atom.hash, Some(atom));
    }

    /// Record a removal about to be sent.
    pub fn record_removed(&mut self, hash: ObjectId) {
        self.record(hash, None);
    }

    fn record(&mut self, hash: ObjectId, atom: Option<Atom>) {
        if let Some(seq) = self.by_hash.remove(&hash) {
            self.order.remove(&seq);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, (hash, atom));
        self.by_hash.insert(hash, seq);
    }

    /// Drop every entry whose hash was acknowledged. Returns how many were
    /// removed; unknown hashes are ignored.
    pub fn acknowledge<'a>(&mut self, hashes: impl IntoIterator<Item = &'a ObjectId>) -> usize {
        let mut removed = 0;
        for hash in hashes {
            if let Some(seq) = self.by_hash.remove(hash) {
                self.order.remove(&seq);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, hash: &ObjectId) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Build the `repo/add_atoms` payloads that re-send everything pending,
    /// in recorded order, at most `batch_size` entries per payload (`None`
    /// for a single payload).
    pub fn resend_events(&self, branch: &str, batch_size: Option<usize>) -> Vec<AddAtomsEvent> {
        if self.order.is_empty() {
            return Vec::new();
        }
        let entries: Vec<&(ObjectId, Option<Atom>)> = self.order.values().collect();
        let chunk = batch_size.unwrap_or(entries.len()).max(1);
        entries
            .chunks(chunk)
            .map(|chunk| {
                let mut atoms = Vec::new();
                let mut removed = Vec::new();
                for (hash, atom) in chunk {
                    match atom {
                        Some(atom) => atoms.push(atom.clone()),
                        None => removed.push(*hash),
                    }
                }
                AddAtomsEvent {
                    branch: branch.to_string(),
                    atoms: (!atoms.is_empty()).then_some(atoms),
                    removed_atoms: (!removed.is_empty()).then_some(removed),
                }
            })
            .collect()
    }
}
