use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, info};

use crep_index::create_index;
use crep_store::{CausalRepoBranch, CausalRepoCommit, CausalRepoObject, CausalRepoStore};
use crep_types::ObjectId;
use crep_weave::{Atom, Weave};

use crate::error::{RepoError, RepoResult};
use crate::history::{load_atoms, load_branch, load_index, update_branch};

/// Staged changes since the last commit.
#[derive(Clone, Debug, Default)]
struct Stage {
    additions: BTreeMap<ObjectId, Atom>,
    deletions: BTreeSet<ObjectId>,
}

impl Stage {
    fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}

/// A working copy of one branch over a store.
///
/// `add` and `remove` change the working atom set and stage the change;
/// `commit` writes the staged atoms, a new index and a commit, then moves
/// the branch. Nothing reaches the store before `commit` or `reset`.
pub struct CausalRepo<S> {
    store: S,
    branch: Option<CausalRepoBranch>,
    commit: Option<CausalRepoCommit>,
    atoms: BTreeMap<ObjectId, Atom>,
    stage: Stage,
}

impl<S: CausalRepoStore> CausalRepo<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            branch: None,
            commit: None,
            atoms: BTreeMap::new(),
            stage: Stage::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The checked-out branch.
    pub fn branch(&self) -> Option<&CausalRepoBranch> {
        self.branch.as_ref()
    }

    /// Switch to a branch, discarding staged changes. A branch that does
    /// not exist yet starts empty and is created by the first commit.
    pub fn checkout(&mut self, name: &str) -> RepoResult<()> {
        self.stage = Stage::default();
        match load_branch(&self.store, name)? {
            Some(loaded) => {
                self.atoms = loaded.atoms.into_iter().map(|a| (a.hash, a)).collect();
                self.commit = loaded.commit;
                self.branch = Some(loaded.branch);
            }
            None => {
                self.atoms.clear();
                self.commit = None;
                self.branch = Some(CausalRepoBranch::new(name, ObjectId::null(), Utc::now()));
            }
        }
        info!(branch = name, atoms = self.atoms.len(), "checked out");
        Ok(())
    }

    /// Stage atoms. Atoms already in the working set are ignored.
    pub fn add(&mut self, atoms: impl IntoIterator<Item = Atom>) {
        for atom in atoms {
            if self.atoms.contains_key(&atom.hash) {
                continue;
            }
            let hash = atom.hash;
            if !self.stage.deletions.remove(&hash) {
                self.stage.additions.insert(hash, atom.clone());
            }
            self.atoms.insert(hash, atom);
        }
    }

    /// Stage removals. Hashes not in the working set are ignored.
    pub fn remove<'a>(&mut self, hashes: impl IntoIterator<Item = &'a ObjectId>) {
        for hash in hashes {
            if self.atoms.remove(hash).is_none() {
                continue;
            }
            if self.stage.additions.remove(hash).is_none() {
                self.stage.deletions.insert(*hash);
            }
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.stage.is_empty()
    }

    /// Commit the staged changes. Returns `None` if nothing is staged.
    pub fn commit(&mut self, message: &str) -> RepoResult<Option<CausalRepoCommit>> {
        if !self.has_changes() {
            return Ok(None);
        }
        let mut branch = self.branch.clone().ok_or(RepoError::NoBranch)?;

        let index = create_index(self.atoms.values());
        let commit = CausalRepoCommit::new(message, Utc::now(), index.hash, self.commit.as_ref())?;

        let mut objects: Vec<CausalRepoObject> = self
            .stage
            .additions
            .values()
            .cloned()
            .map(CausalRepoObject::atom)
            .collect();
        objects.push(CausalRepoObject::index(index));
        objects.push(CausalRepoObject::Commit(commit.clone()));
        self.store.store_objects(&objects)?;

        branch.hash = commit.hash;
        branch.time = commit.time;
        update_branch(&self.store, &branch)?;
        info!(branch = %branch.name, commit = %commit.hash.short_hex(), msg = message, "committed");

        self.branch = Some(branch);
        self.commit = Some(commit.clone());
        self.stage = Stage::default();
        Ok(Some(commit))
    }

    /// Point the branch at the commit or index `hash` and load its atoms,
    /// discarding staged changes.
    ///
    /// Resetting to a bare index keeps the current commit, so the next
    /// commit still descends from the existing history.
    pub fn reset(&mut self, hash: &ObjectId) -> RepoResult<()> {
        let mut branch = self.branch.clone().ok_or(RepoError::NoBranch)?;
        let (commit, index) = load_index(&self.store, hash)?;
        let atoms = load_atoms(&self.store, &index)?;

        branch.hash = *hash;
        branch.time = Utc::now();
        update_branch(&self.store, &branch)?;
        debug!(branch = %branch.name, target = %hash.short_hex(), "reset");

        self.atoms = atoms.into_iter().map(|a| (a.hash, a)).collect();
        if commit.is_some() {
            self.commit = commit;
        }
        self.branch = Some(branch);
        self.stage = Stage::default();
        Ok(())
    }

    /// The last commit on the checked-out branch.
    pub fn current_commit(&self) -> Option<&CausalRepoCommit> {
        self.commit.as_ref()
    }

    /// The working atom set, including staged changes.
    pub fn atoms(&self) -> impl Iterator<Item = &Atom> + '_ {
        self.atoms.values()
    }

    /// Rebuild a validated weave from the working atom set.
    pub fn weave(&self) -> RepoResult<Weave> {
        let mut weave = Weave::new();
        let result = weave.import_all(self.atoms.values().cloned());
        if let Some(rejection) = result.rejected.first() {
            return Err(RepoError::AtomRejected {
                atom: rejection.atom.id.to_string(),
                reason: rejection.reason.to_string(),
            });
        }
        weave.validate()?;
        Ok(weave)
    }
}
