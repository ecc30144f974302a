//! Store-level operations over branches, commits and indexes.
//!
//! These take any [`CausalRepoStore`] and never cache; [`crate::CausalRepo`]
//! is the stateful layer built on top of them.

use std::collections::HashSet;

use tracing::{debug, info};

use crep_crypto::HashChainVerifier;
use crep_index::{calculate_diff, create_index, AtomIndex};
use crep_store::{
    CausalRepoBranch, CausalRepoCommit, CausalRepoObject, CausalRepoReflog, CausalRepoStore,
    ObjectKind,
};
use crep_types::ObjectId;
use crep_weave::Atom;

use crate::error::{RepoError, RepoResult};

/// A branch with its commit, index and atoms resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedBranch {
    pub branch: CausalRepoBranch,
    /// `None` when the branch points straight at an index, or at nothing.
    pub commit: Option<CausalRepoCommit>,
    pub index: AtomIndex,
    pub atoms: Vec<Atom>,
}

/// Atoms added and removed between two commits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitDiff {
    pub additions: Vec<Atom>,
    pub deletions: Vec<ObjectId>,
}

impl CommitDiff {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}

/// Persist atoms together with an index over them. Returns the index.
pub fn store_atoms<S: CausalRepoStore + ?Sized>(store: &S, atoms: &[Atom]) -> RepoResult<AtomIndex> {
    let index = create_index(atoms);
    let mut objects = Vec::with_capacity(atoms.len() + 1);
    objects.push(CausalRepoObject::index(index.clone()));
    objects.extend(atoms.iter().cloned().map(CausalRepoObject::atom));
    store.store_objects(&objects)?;
    debug!(index = %index.hash, atoms = atoms.len(), "stored atoms");
    Ok(index)
}

/// Resolve the commit or index at `hash` to its index.
pub fn load_index<S: CausalRepoStore + ?Sized>(
    store: &S,
    hash: &ObjectId,
) -> RepoResult<(Option<CausalRepoCommit>, AtomIndex)> {
    match fetch(store, hash)? {
        CausalRepoObject::Commit(commit) => {
            let index = match fetch(store, &commit.index)? {
                CausalRepoObject::Index { data } => data,
                other => return Err(unexpected(commit.index, ObjectKind::Index, &other)),
            };
            Ok((Some(commit), index))
        }
        CausalRepoObject::Index { data } => Ok((None, data)),
        other => Err(unexpected(*hash, ObjectKind::Commit, &other)),
    }
}

/// Load every atom an index lists.
pub fn load_atoms<S: CausalRepoStore + ?Sized>(store: &S, index: &AtomIndex) -> RepoResult<Vec<Atom>> {
    let hashes: Vec<ObjectId> = index.atoms.values().copied().collect();
    load_atoms_by_hash(store, &hashes)
}

fn load_atoms_by_hash<S: CausalRepoStore + ?Sized>(
    store: &S,
    hashes: &[ObjectId],
) -> RepoResult<Vec<Atom>> {
    let objects = store.get_objects(hashes)?;
    hashes
        .iter()
        .zip(objects)
        .map(|(hash, object)| match object {
            Some(CausalRepoObject::Atom { data }) => Ok(data),
            Some(other) => Err(unexpected(*hash, ObjectKind::Atom, &other)),
            None => Err(RepoError::ObjectNotFound(*hash)),
        })
        .collect()
}

/// Load a branch and everything it points at. `Ok(None)` if the branch
/// does not exist.
pub fn load_branch<S: CausalRepoStore + ?Sized>(
    store: &S,
    name: &str,
) -> RepoResult<Option<LoadedBranch>> {
    let Some(branch) = store.get_branch(name)? else {
        return Ok(None);
    };
    if branch.hash.is_null() {
        return Ok(Some(LoadedBranch {
            branch,
            commit: None,
            index: AtomIndex::empty(),
            atoms: Vec::new(),
        }));
    }
    let (commit, index) = load_index(store, &branch.hash)?;
    let atoms = load_atoms(store, &index)?;
    debug!(branch = name, atoms = atoms.len(), "loaded branch");
    Ok(Some(LoadedBranch {
        branch,
        commit,
        index,
        atoms,
    }))
}

/// Save a branch and record its new target in the reflog.
pub fn update_branch<S: CausalRepoStore + ?Sized>(
    store: &S,
    branch: &CausalRepoBranch,
) -> RepoResult<CausalRepoReflog> {
    store.save_branch(branch)?;
    let reflog = store.log_branch(branch)?;
    info!(branch = %branch.name, target = %branch.hash.short_hex(), "branch updated");
    Ok(reflog)
}

/// The commit at `hash` and all its ancestors, newest first.
///
/// A missing starting commit yields an empty list; a missing ancestor is
/// an error since the history is then incomplete.
pub fn list_commits<S: CausalRepoStore + ?Sized>(
    store: &S,
    hash: &ObjectId,
) -> RepoResult<Vec<CausalRepoCommit>> {
    let mut commits = Vec::new();
    let mut seen = HashSet::new();
    let mut next = match store.get_object(hash)? {
        None => return Ok(commits),
        Some(CausalRepoObject::Commit(commit)) => Some(commit),
        Some(other) => return Err(unexpected(*hash, ObjectKind::Commit, &other)),
    };
    while let Some(commit) = next.take() {
        if !seen.insert(commit.hash) {
            break;
        }
        if let Some(previous) = commit.previous_commit {
            next = match fetch(store, &previous)? {
                CausalRepoObject::Commit(c) => Some(c),
                other => return Err(unexpected(previous, ObjectKind::Commit, &other)),
            };
        }
        commits.push(commit);
    }
    Ok(commits)
}

/// Check the hash chain from the commit at `hash` back to the first
/// commit. Returns the number of commits verified.
pub fn verify_history<S: CausalRepoStore + ?Sized>(store: &S, hash: &ObjectId) -> RepoResult<usize> {
    let mut commits = list_commits(store, hash)?;
    commits.reverse();
    HashChainVerifier::verify_chain(&commits)?;
    Ok(commits.len())
}

/// Atoms added and removed going from `first` to `second`. A `first` of
/// `None` diffs against the empty state.
pub fn calculate_commit_diff<S: CausalRepoStore + ?Sized>(
    store: &S,
    first: Option<&CausalRepoCommit>,
    second: &CausalRepoCommit,
) -> RepoResult<CommitDiff> {
    let before = match first {
        Some(commit) => load_index(store, &commit.hash)?.1,
        None => AtomIndex::empty(),
    };
    let (_, after) = load_index(store, &second.hash)?;

    let diff = calculate_diff(&before, &after);
    let added: Vec<ObjectId> = diff.additions.values().copied().collect();
    Ok(CommitDiff {
        additions: load_atoms_by_hash(store, &added)?,
        deletions: diff.deletions.values().copied().collect(),
    })
}

fn fetch<S: CausalRepoStore + ?Sized>(store: &S, hash: &ObjectId) -> RepoResult<CausalRepoObject> {
    store
        .get_object(hash)?
        .ok_or(RepoError::ObjectNotFound(*hash))
}

fn unexpected(hash: ObjectId, expected: ObjectKind, found: &CausalRepoObject) -> RepoError {
    RepoError::UnexpectedObject {
        hash,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crep_crypto::ChainError;
    use crep_store::MemoryCausalRepoStore;
    use crep_types::{AtomId, SiteId};
    use serde_json::json;

    fn atom(timestamp: u64, cause: Option<&Atom>) -> Atom {
        let id = AtomId::new(SiteId::new("a").unwrap(), timestamp, 0);
        Atom::new(id, cause.map(|c| c.id.clone()), json!(timestamp)).unwrap()
    }

    fn commit_atoms(
        store: &MemoryCausalRepoStore,
        message: &str,
        atoms: &[Atom],
        previous: Option<&CausalRepoCommit>,
    ) -> CausalRepoCommit {
        let index = store_atoms(store, atoms).unwrap();
        let commit = CausalRepoCommit::new(message, Utc::now(), index.hash, previous).unwrap();
        store
            .store_objects(&[CausalRepoObject::Commit(commit.clone())])
            .unwrap();
        commit
    }

    #[test]
    fn load_branch_resolves_commit_index_and_atoms() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let child = atom(2, Some(&root));
        let commit = commit_atoms(&store, "first", &[root.clone(), child.clone()], None);
        let branch = CausalRepoBranch::new("main", commit.hash, Utc::now());
        update_branch(&store, &branch).unwrap();

        let loaded = load_branch(&store, "main").unwrap().unwrap();
        assert_eq!(loaded.commit, Some(commit));
        assert_eq!(loaded.index.len(), 2);
        assert_eq!(loaded.atoms, vec![root, child]);
        assert_eq!(store.get_reflog("main").unwrap().len(), 1);
    }

    #[test]
    fn load_branch_at_an_index() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let index = store_atoms(&store, &[root.clone()]).unwrap();
        store
            .save_branch(&CausalRepoBranch::new("idx", index.hash, Utc::now()))
            .unwrap();

        let loaded = load_branch(&store, "idx").unwrap().unwrap();
        assert!(loaded.commit.is_none());
        assert_eq!(loaded.atoms, vec![root]);
        assert!(load_branch(&store, "missing").unwrap().is_none());
    }

    #[test]
    fn missing_atom_is_reported() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let index = create_index([&root]);
        store
            .store_objects(&[CausalRepoObject::index(index.clone())])
            .unwrap();
        assert!(matches!(
            load_atoms(&store, &index),
            Err(RepoError::ObjectNotFound(hash)) if hash == root.hash
        ));
    }

    #[test]
    fn list_commits_newest_first_and_verify() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let child = atom(2, Some(&root));
        let first = commit_atoms(&store, "first", &[root.clone()], None);
        let second = commit_atoms(&store, "second", &[root, child], Some(&first));

        let commits = list_commits(&store, &second.hash).unwrap();
        assert_eq!(commits, vec![second.clone(), first]);
        assert_eq!(verify_history(&store, &second.hash).unwrap(), 2);
        assert!(list_commits(&store, &ObjectId::from_bytes(b"nope"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn tampered_commit_fails_verification() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let mut first = commit_atoms(&store, "first", &[root], None);
        first.message = "rewritten".into();
        store
            .store_objects(&[CausalRepoObject::Commit(first.clone())])
            .unwrap();
        assert!(matches!(
            verify_history(&store, &first.hash),
            Err(RepoError::History(ChainError::HashMismatch { index: 0 }))
        ));
    }

    #[test]
    fn commit_diff_reports_added_and_removed_atoms() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        let a = atom(2, Some(&root));
        let b = atom(3, Some(&root));
        let first = commit_atoms(&store, "first", &[root.clone(), a.clone()], None);
        let second = commit_atoms(&store, "second", &[root.clone(), b.clone()], Some(&first));

        let diff = calculate_commit_diff(&store, Some(&first), &second).unwrap();
        assert_eq!(diff.additions, vec![b]);
        assert_eq!(diff.deletions, vec![a.hash]);

        let from_nothing = calculate_commit_diff(&store, None, &first).unwrap();
        assert_eq!(from_nothing.additions.len(), 2);
        assert!(from_nothing.deletions.is_empty());
        assert!(calculate_commit_diff(&store, Some(&first), &first)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn wrong_object_kind_is_reported() {
        let store = MemoryCausalRepoStore::new();
        let root = atom(1, None);
        store
            .store_objects(&[CausalRepoObject::atom(root.clone())])
            .unwrap();
        assert!(matches!(
            load_index(&store, &root.hash),
            Err(RepoError::UnexpectedObject {
                found: ObjectKind::Atom,
                ..
            })
        ));
    }
}
