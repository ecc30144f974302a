//! The weave: a causal tree flattened into its depth-first order.
//!
//! Atoms live in an arena (`Vec`) and are threaded into a singly linked
//! preorder sequence through `next` indices. A `(site, timestamp)` map gives
//! O(1) cause lookup. The sequence is only ever extended by [`Weave::insert`].
//!
//! # Invariants
//!
//! - At most one root, and it is always the head of the sequence.
//! - Every atom appears after its cause and inside its cause's subtree.
//! - Siblings are ordered by [`AtomId::sibling_cmp`].
//! - A child's timestamp is greater than its cause's. The subtree walk
//!   relies on this: the first atom whose cause is older than the subtree
//!   root has left the subtree. `insert` refuses atoms that would break it.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crep_types::{AtomId, SiteId};

use crate::atom::{atom_matches_checksum, Atom};
use crate::error::{AtomRejection, RejectionReason, WeaveError, WeaveResult};

type SlotKey = (SiteId, u64);

fn slot(id: &AtomId) -> SlotKey {
    (id.site.clone(), id.timestamp)
}

#[derive(Clone, Debug)]
struct WeaveNode<T> {
    atom: Atom<T>,
    next: Option<usize>,
}

/// Accepted and rejected atoms from a bulk insertion.
#[derive(Clone, Debug)]
pub struct ImportResult<T> {
    pub added: Vec<Atom<T>>,
    pub rejected: Vec<AtomRejection<T>>,
}

impl<T> Default for ImportResult<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> ImportResult<T> {
    /// Returns `true` if every atom was accepted.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Causality-preserving total order over a set of atoms.
#[derive(Clone, Debug)]
pub struct Weave<T = Value> {
    nodes: Vec<WeaveNode<T>>,
    head: Option<usize>,
    slots: HashMap<SlotKey, usize>,
}

impl<T> Default for Weave<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            head: None,
            slots: HashMap::new(),
        }
    }
}

impl<T> Weave<T> {
    /// Create an empty weave.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of atoms in the weave.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the weave has no atoms.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root atom, if one has been inserted.
    pub fn root(&self) -> Option<&Atom<T>> {
        self.head.map(|idx| &self.nodes[idx].atom)
    }

    /// All root atoms. A weave holds at most one.
    pub fn roots(&self) -> Vec<&Atom<T>> {
        self.root().into_iter().collect()
    }

    /// Look up an atom by id. The id must match exactly, priority included.
    pub fn get_atom(&self, id: &AtomId) -> Option<&Atom<T>> {
        self.slot_of(id).map(|idx| &self.nodes[idx].atom)
    }

    /// Returns `true` if the weave holds an atom with exactly this id.
    pub fn contains(&self, id: &AtomId) -> bool {
        self.slot_of(id).is_some()
    }

    /// Iterate every atom in weave order.
    pub fn iter(&self) -> WeaveIter<'_, T> {
        WeaveIter {
            weave: self,
            cursor: self.head,
        }
    }

    /// Iterate in weave order starting at (and including) `id`.
    ///
    /// Yields nothing if `id` is not in the weave.
    pub fn iter_from(&self, id: &AtomId) -> WeaveIter<'_, T> {
        WeaveIter {
            weave: self,
            cursor: self.slot_of(id),
        }
    }

    /// Lazily iterate everything in `parent`'s subtree, excluding `parent`.
    ///
    /// Each call starts a fresh walk. Yields nothing if `parent` is not in
    /// the weave.
    pub fn descendants(&self, parent: &AtomId) -> Descendants<'_, T> {
        match self.slot_of(parent) {
            Some(idx) => Descendants {
                weave: self,
                cursor: self.nodes[idx].next,
                parent_timestamp: self.nodes[idx].atom.id.timestamp,
            },
            None => Descendants {
                weave: self,
                cursor: None,
                parent_timestamp: 0,
            },
        }
    }

    /// The path from `id` up to the root: `[atom, cause, ..., root]`.
    ///
    /// Fails if `id` is unknown or any cause along the way is missing, which
    /// means the weave is corrupt or only partially loaded.
    pub fn reference_chain(&self, id: &AtomId) -> WeaveResult<Vec<&Atom<T>>> {
        let mut current = self
            .get_atom(id)
            .ok_or_else(|| WeaveError::AtomNotFound(id.clone()))?;
        let mut chain = vec![current];
        while let Some(cause) = &current.cause {
            current = self
                .get_atom(cause)
                .ok_or_else(|| WeaveError::MissingCause {
                    atom: current.id.clone(),
                    cause: cause.clone(),
                })?;
            chain.push(current);
        }
        Ok(chain)
    }

    fn slot_of(&self, id: &AtomId) -> Option<usize> {
        let idx = *self.slots.get(&slot(id))?;
        (self.nodes[idx].atom.id == *id).then_some(idx)
    }
}

impl<T: Serialize + Clone> Weave<T> {
    /// Insert one atom at its causal position.
    ///
    /// Re-inserting an atom that is already present returns the stored atom
    /// and leaves the weave unchanged. Every failure is returned as a
    /// rejection carrying the atom; insertion never panics.
    pub fn insert(&mut self, atom: Atom<T>) -> Result<Atom<T>, AtomRejection<T>> {
        if !atom_matches_checksum(&atom) {
            return Err(reject(atom, RejectionReason::ChecksumFailed));
        }

        if let Some(&existing) = self.slots.get(&slot(&atom.id)) {
            let existing = &self.nodes[existing].atom;
            if existing.id == atom.id {
                return Ok(existing.clone());
            }
            return Err(reject(atom, RejectionReason::ConflictingId));
        }

        let Some(cause_id) = atom.cause.clone() else {
            if self.head.is_some() {
                return Err(reject(atom, RejectionReason::SecondRootNotAllowed));
            }
            let idx = self.push_node(atom, None);
            self.head = Some(idx);
            return Ok(self.nodes[idx].atom.clone());
        };

        let Some(cause_idx) = self.slot_of(&cause_id) else {
            return Err(reject(atom, RejectionReason::CauseNotFound));
        };
        if atom.id.timestamp <= self.nodes[cause_idx].atom.id.timestamp {
            return Err(reject(atom, RejectionReason::InvalidTimestamp));
        }

        let prev = self.insertion_point(cause_idx, &atom.id);
        let next = self.nodes[prev].next;
        let idx = self.push_node(atom, next);
        self.nodes[prev].next = Some(idx);
        Ok(self.nodes[idx].atom.clone())
    }

    /// Insert atoms in the given order, collecting accepted and rejected ones.
    ///
    /// A list whose order does not respect causality produces
    /// `cause_not_found` rejections; see [`Weave::import_all`].
    pub fn insert_many(&mut self, atoms: impl IntoIterator<Item = Atom<T>>) -> ImportResult<T> {
        let mut result = ImportResult::default();
        for atom in atoms {
            match self.insert(atom) {
                Ok(added) => result.added.push(added),
                Err(rejection) => result.rejected.push(rejection),
            }
        }
        result
    }

    /// Insert atoms in any order, re-offering `cause_not_found` rejections
    /// until a full pass makes no progress.
    ///
    /// Whatever is left in `rejected` either failed permanently or is
    /// missing a cause that was never supplied.
    pub fn import_all(&mut self, atoms: impl IntoIterator<Item = Atom<T>>) -> ImportResult<T> {
        let mut result = self.insert_many(atoms);
        loop {
            let (retry, permanent): (Vec<_>, Vec<_>) = std::mem::take(&mut result.rejected)
                .into_iter()
                .partition(|r| r.reason.is_retryable());
            result.rejected = permanent;
            if retry.is_empty() {
                break;
            }
            let attempted = retry.len();
            let pass = self.insert_many(retry.into_iter().map(|r| r.atom));
            let progressed = pass.rejected.len() < attempted;
            result.added.extend(pass.added);
            if !progressed {
                result.rejected.extend(pass.rejected);
                break;
            }
            result.rejected.extend(pass.rejected);
        }
        result
    }

    /// Extract the smallest causally closed weave containing every atom in
    /// `parents`: each atom's reference chain plus its whole subtree.
    pub fn subweave(&self, parents: &[AtomId]) -> WeaveResult<Weave<T>> {
        let mut weave = Weave::new();
        for parent in parents {
            let mut chain = self.reference_chain(parent)?;
            chain.reverse();
            let atoms = chain
                .into_iter()
                .chain(self.descendants(parent))
                .cloned();
            for atom in atoms {
                if let Err(rejection) = weave.insert(atom) {
                    return Err(WeaveError::SubweaveRejected {
                        atom: rejection.atom.id,
                        reason: rejection.reason,
                    });
                }
            }
        }
        Ok(weave)
    }

    /// Check every structural invariant over the full sequence.
    pub fn validate(&self) -> WeaveResult<()> {
        let mut seen: HashSet<SlotKey> = HashSet::new();
        let mut last_child: HashMap<SlotKey, &AtomId> = HashMap::new();
        let invalid = |atom: &AtomId, reason: &str| WeaveError::Invalid {
            atom: atom.clone(),
            reason: reason.to_string(),
        };

        for (position, atom) in self.iter().enumerate() {
            if position >= self.nodes.len() {
                return Err(invalid(&atom.id, "sequence is longer than the weave"));
            }
            if self.get_atom(&atom.id).map(|a| a.hash) != Some(atom.hash) {
                return Err(invalid(&atom.id, "not retrievable by id"));
            }
            if !atom_matches_checksum(atom) {
                return Err(invalid(&atom.id, "checksum mismatch"));
            }
            match &atom.cause {
                None if position != 0 => {
                    return Err(invalid(&atom.id, "root is not first"));
                }
                None => {}
                Some(cause) => {
                    let cause_atom = self
                        .get_atom(cause)
                        .ok_or_else(|| invalid(&atom.id, "cause is missing"))?;
                    if !seen.contains(&slot(cause)) {
                        return Err(invalid(&atom.id, "appears before its cause"));
                    }
                    if atom.id.timestamp <= cause_atom.id.timestamp {
                        return Err(invalid(&atom.id, "timestamp does not follow its cause"));
                    }
                    if let Some(previous) = last_child.get(&slot(cause)) {
                        if previous.sibling_cmp(&atom.id) != Ordering::Less {
                            return Err(invalid(&atom.id, "siblings out of order"));
                        }
                    }
                    last_child.insert(slot(cause), &atom.id);
                }
            }
            seen.insert(slot(&atom.id));
        }

        match self
            .nodes
            .iter()
            .find(|n| !seen.contains(&slot(&n.atom.id)))
        {
            Some(node) => Err(invalid(&node.atom.id, "unreachable from the root")),
            None => Ok(()),
        }
    }

    /// Returns `true` if [`Weave::validate`] finds no problem.
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "weave failed validation");
                false
            }
        }
    }

    /// All atoms, cloned, in weave order.
    pub fn atoms(&self) -> Vec<Atom<T>> {
        self.iter().cloned().collect()
    }

    /// Walk forward from the cause, past earlier siblings and their subtrees,
    /// and return the node the new atom goes after.
    fn insertion_point(&self, cause_idx: usize, id: &AtomId) -> usize {
        let cause = &self.nodes[cause_idx].atom.id;
        let mut prev = cause_idx;
        let mut cursor = self.nodes[cause_idx].next;
        while let Some(idx) = cursor {
            let current = &self.nodes[idx].atom;
            let Some(current_cause) = &current.cause else {
                break;
            };
            if current_cause.timestamp < cause.timestamp {
                break;
            }
            if current_cause == cause && id.sibling_cmp(&current.id) == Ordering::Less {
                break;
            }
            prev = idx;
            cursor = self.nodes[idx].next;
        }
        prev
    }

    fn push_node(&mut self, atom: Atom<T>, next: Option<usize>) -> usize {
        let idx = self.nodes.len();
        debug!(atom = %atom.id, hash = %atom.hash.short_hex(), "inserted atom");
        self.slots.insert(slot(&atom.id), idx);
        self.nodes.push(WeaveNode { atom, next });
        idx
    }
}

fn reject<T>(atom: Atom<T>, reason: RejectionReason) -> AtomRejection<T> {
    debug!(atom = %atom.id, %reason, "atom rejected");
    AtomRejection { reason, atom }
}

/// Iterator over atoms in weave order.
pub struct WeaveIter<'a, T> {
    weave: &'a Weave<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for WeaveIter<'a, T> {
    type Item = &'a Atom<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = &self.weave.nodes[idx];
        self.cursor = node.next;
        Some(&node.atom)
    }
}

/// Lazy walk over one atom's subtree.
pub struct Descendants<'a, T> {
    weave: &'a Weave<T>,
    cursor: Option<usize>,
    parent_timestamp: u64,
}

impl<'a, T> Iterator for Descendants<'a, T> {
    type Item = &'a Atom<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = &self.weave.nodes[idx];
        let inside = node
            .atom
            .cause
            .as_ref()
            .is_some_and(|cause| cause.timestamp >= self.parent_timestamp);
        if !inside {
            self.cursor = None;
            return None;
        }
        self.cursor = node.next;
        Some(&node.atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;
    use serde_json::json;

    fn id(site: &str, timestamp: u64) -> AtomId {
        AtomId::new(SiteId::new(site).unwrap(), timestamp, 0)
    }

    fn pid(site: &str, timestamp: u64, priority: u32) -> AtomId {
        AtomId::new(SiteId::new(site).unwrap(), timestamp, priority)
    }

    fn root(site: &str, timestamp: u64) -> Atom {
        atom(id(site, timestamp), None::<&Atom>, json!("root")).unwrap()
    }

    fn child(cause: &Atom, id: AtomId) -> Atom {
        let value = json!(id.key());
        atom(id, Some(cause), value).unwrap()
    }

    fn keys(weave: &Weave) -> Vec<String> {
        weave.iter().map(|a| a.id.key()).collect()
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    #[test]
    fn insert_root_and_children() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let c = child(&r, id("a", 2));
        weave.insert(r.clone()).unwrap();
        weave.insert(c.clone()).unwrap();
        assert_eq!(weave.len(), 2);
        assert_eq!(weave.root(), Some(&r));
        assert_eq!(weave.get_atom(&c.id), Some(&c));
    }

    #[test]
    fn checksum_failure_leaves_weave_untouched() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        weave.insert(r.clone()).unwrap();

        let mut bad = child(&r, id("a", 2));
        bad.value = json!("tampered");
        let rejection = weave.insert(bad).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::ChecksumFailed);
        assert_eq!(weave.len(), 1);
        assert!(weave.get_atom(&id("a", 2)).is_none());
    }

    #[test]
    fn second_root_is_rejected() {
        let mut weave = Weave::new();
        weave.insert(root("a", 1)).unwrap();
        let rejection = weave.insert(root("b", 1)).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::SecondRootNotAllowed);
        assert_eq!(rejection.atom.id, id("b", 1));
        assert_eq!(weave.roots().len(), 1);
    }

    #[test]
    fn missing_cause_is_rejected() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let c = child(&r, id("a", 2));
        let rejection = weave.insert(c).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::CauseNotFound);
        assert!(weave.is_empty());
    }

    #[test]
    fn cause_with_different_priority_is_not_found() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        weave.insert(r.clone()).unwrap();
        let wrong_cause = atom(pid("a", 1, 4), None::<&Atom>, json!("root")).unwrap();
        let c = child(&wrong_cause, id("b", 2));
        let rejection = weave.insert(c).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::CauseNotFound);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let c = child(&r, id("a", 2));
        weave.insert(r.clone()).unwrap();
        let first = weave.insert(c.clone()).unwrap();
        let second = weave.insert(c.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(weave.len(), 2);

        // Re-delivering the root is also harmless.
        assert_eq!(weave.insert(r.clone()).unwrap(), r);
        assert_eq!(weave.len(), 2);
    }

    #[test]
    fn reused_slot_with_new_priority_conflicts() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        weave.insert(r.clone()).unwrap();
        weave.insert(child(&r, id("b", 2))).unwrap();
        let rejection = weave.insert(child(&r, pid("b", 2, 1))).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::ConflictingId);
        assert_eq!(weave.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn newer_siblings_come_first() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        weave.insert(r.clone()).unwrap();
        weave.insert(child(&r, id("a", 2))).unwrap();
        weave.insert(child(&r, id("a", 3))).unwrap();
        weave.insert(child(&r, id("b", 4))).unwrap();
        assert_eq!(keys(&weave), ["a@1", "b@4", "a@3", "a@2"]);
        assert!(weave.is_valid());
    }

    #[test]
    fn priority_beats_timestamp() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        weave.insert(r.clone()).unwrap();
        weave.insert(child(&r, id("a", 5))).unwrap();
        weave.insert(child(&r, pid("b", 2, 1))).unwrap();
        assert_eq!(keys(&weave), ["a@1", "b@2", "a@5"]);
        assert!(weave.is_valid());
    }

    #[test]
    fn site_breaks_timestamp_ties() {
        let mut weave = Weave::new();
        let r = root("r", 1);
        weave.insert(r.clone()).unwrap();
        weave.insert(child(&r, id("b", 2))).unwrap();
        weave.insert(child(&r, id("a", 2))).unwrap();
        assert_eq!(keys(&weave), ["r@1", "a@2", "b@2"]);
    }

    #[test]
    fn new_sibling_skips_earlier_sibling_subtrees() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let first = child(&r, id("a", 5));
        let grandchild = child(&first, id("a", 6));
        weave.insert(r.clone()).unwrap();
        weave.insert(first.clone()).unwrap();
        weave.insert(grandchild.clone()).unwrap();

        // Older than `first`, so it goes after first's entire subtree.
        weave.insert(child(&r, id("b", 3))).unwrap();
        assert_eq!(keys(&weave), ["a@1", "a@5", "a@6", "b@3"]);
        assert!(weave.is_valid());
    }

    #[test]
    fn child_lands_directly_after_its_cause() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&r, id("a", 3));
        weave.insert(r.clone()).unwrap();
        weave.insert(x.clone()).unwrap();
        weave.insert(y.clone()).unwrap();
        weave.insert(child(&x, id("b", 4))).unwrap();
        assert_eq!(keys(&weave), ["a@1", "a@3", "a@2", "b@4"]);
        assert!(weave.is_valid());
    }

    #[test]
    fn every_atom_follows_its_cause() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let a = child(&r, id("a", 2));
        let b = child(&a, id("b", 3));
        let c = child(&r, id("c", 4));
        let d = child(&b, id("a", 5));
        for atom in [r, a, b, c, d] {
            weave.insert(atom).unwrap();
        }
        let order = weave.atoms();
        for (pos, atom) in order.iter().enumerate() {
            if let Some(cause) = &atom.cause {
                let cause_pos = order.iter().position(|a| &a.id == cause).unwrap();
                assert!(cause_pos < pos);
                assert!(atom.id.timestamp > cause.timestamp);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    #[test]
    fn descendants_of_bot_yield_tag_then_value() {
        let mut weave = Weave::new();
        let bot1 = root("a", 1);
        let tag1 = child(&bot1, id("a", 2));
        let value1 = child(&tag1, id("a", 3));
        weave.insert(bot1.clone()).unwrap();
        weave.insert(tag1.clone()).unwrap();
        weave.insert(value1.clone()).unwrap();

        let found: Vec<&Atom> = weave.descendants(&bot1.id).collect();
        assert_eq!(found, vec![&tag1, &value1]);

        // Fresh call, fresh sequence.
        assert_eq!(weave.descendants(&bot1.id).count(), 2);
    }

    #[test]
    fn descendants_stop_at_subtree_boundary() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let older = child(&r, id("a", 2));
        let newer = child(&r, id("a", 3));
        let under_newer = child(&newer, id("b", 4));
        for atom in [r, older.clone(), newer.clone(), under_newer.clone()] {
            weave.insert(atom).unwrap();
        }
        let found: Vec<&Atom> = weave.descendants(&newer.id).collect();
        assert_eq!(found, vec![&under_newer]);
        assert_eq!(weave.descendants(&older.id).count(), 0);
        assert_eq!(weave.descendants(&id("zz", 9)).count(), 0);
    }

    #[test]
    fn iter_from_starts_at_atom() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&x, id("a", 3));
        for atom in [r, x.clone(), y.clone()] {
            weave.insert(atom).unwrap();
        }
        let tail: Vec<&Atom> = weave.iter_from(&x.id).collect();
        assert_eq!(tail, vec![&x, &y]);
        assert_eq!(weave.iter_from(&id("q", 1)).count(), 0);
    }

    #[test]
    fn reference_chain_walks_to_root() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&x, id("b", 3));
        for atom in [r.clone(), x.clone(), y.clone()] {
            weave.insert(atom).unwrap();
        }
        let chain = weave.reference_chain(&y.id).unwrap();
        assert_eq!(chain, vec![&y, &x, &r]);
    }

    #[test]
    fn reference_chain_of_unknown_atom_fails() {
        let weave: Weave = Weave::new();
        assert!(matches!(
            weave.reference_chain(&id("a", 1)),
            Err(WeaveError::AtomNotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Sub-weaves
    // -----------------------------------------------------------------------

    #[test]
    fn subweave_contains_chain_and_descendants_only() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let bot1 = child(&r, id("a", 2));
        let tag1 = child(&bot1, id("a", 3));
        let bot2 = child(&r, id("b", 4));
        let tag2 = child(&bot2, id("b", 5));
        for atom in [&r, &bot1, &tag1, &bot2, &tag2] {
            weave.insert(atom.clone()).unwrap();
        }

        let sub = weave.subweave(&[bot1.id.clone()]).unwrap();
        assert_eq!(keys(&sub), ["a@1", "a@2", "a@3"]);
        assert!(sub.is_valid());
        assert!(sub.get_atom(&bot2.id).is_none());
    }

    #[test]
    fn subweave_of_several_parents_merges() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let bot1 = child(&r, id("a", 2));
        let bot2 = child(&r, id("b", 3));
        let bot3 = child(&r, id("c", 4));
        for atom in [&r, &bot1, &bot2, &bot3] {
            weave.insert(atom.clone()).unwrap();
        }
        let sub = weave.subweave(&[bot1.id.clone(), bot3.id.clone()]).unwrap();
        assert_eq!(keys(&sub), ["a@1", "c@4", "a@2"]);
    }

    #[test]
    fn reimported_subweave_has_no_rejections() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&x, id("b", 3));
        for atom in [r, x.clone(), y] {
            weave.insert(atom).unwrap();
        }
        let sub = weave.subweave(&[x.id.clone()]).unwrap();
        let mut fresh = Weave::new();
        let result = fresh.insert_many(sub.atoms());
        assert!(result.is_complete());
        assert_eq!(keys(&fresh), keys(&sub));
    }

    // -----------------------------------------------------------------------
    // Bulk insertion
    // -----------------------------------------------------------------------

    #[test]
    fn insert_many_partitions_results() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&x, id("a", 3));
        let result = weave.insert_many([y.clone(), r.clone(), x.clone()]);
        assert_eq!(result.added.len(), 2);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].reason, RejectionReason::CauseNotFound);
        assert_eq!(result.rejected[0].atom, y);
    }

    #[test]
    fn import_all_retries_until_stable() {
        let mut weave = Weave::new();
        let r = root("a", 1);
        let x = child(&r, id("a", 2));
        let y = child(&x, id("a", 3));
        let z = child(&y, id("a", 4));
        let orphan = child(&child(&r, id("q", 8)), id("q", 9));

        let result = weave.import_all([z, y, orphan.clone(), x, r]);
        assert_eq!(result.added.len(), 4);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].atom, orphan);
        assert_eq!(keys(&weave), ["a@1", "a@2", "a@3", "a@4"]);
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn empty_weave_is_valid() {
        assert!(Weave::<Value>::new().is_valid());
    }

    #[test]
    fn child_not_newer_than_cause_is_rejected() {
        let mut weave = Weave::new();
        let r = root("a", 5);
        weave.insert(r.clone()).unwrap();

        let older = child(&r, id("b", 3));
        let rejection = weave.insert(older.clone()).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::InvalidTimestamp);
        assert!(!rejection.reason.is_retryable());
        let same = weave.insert(child(&r, id("b", 5))).unwrap_err();
        assert_eq!(same.reason, RejectionReason::InvalidTimestamp);

        // Nothing can hang off the refused atom either.
        let under_older = child(&older, id("b", 4));
        assert_eq!(
            weave.insert(under_older).unwrap_err().reason,
            RejectionReason::CauseNotFound
        );
        assert_eq!(weave.len(), 1);
        assert!(weave.is_valid());
        assert_eq!(weave.subweave(&[r.id.clone()]).unwrap().len(), 1);
    }
}
