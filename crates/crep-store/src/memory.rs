//! In-memory reference store for testing and ephemeral use.
//!
//! [`MemoryCausalRepoStore`] keeps objects, branches and audit logs in maps
//! behind `RwLock`s. Data is lost when the store is dropped.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crep_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{
    CausalRepoBranch, CausalRepoBranchSettings, CausalRepoObject, CausalRepoReflog,
    CausalRepoSitelog,
};
use crate::traits::{filter_branches, CausalRepoStore};

/// An in-memory implementation of [`CausalRepoStore`].
#[derive(Debug, Default)]
pub struct MemoryCausalRepoStore {
    objects: RwLock<HashMap<ObjectId, CausalRepoObject>>,
    branches: RwLock<HashMap<String, CausalRepoBranch>>,
    reflogs: RwLock<HashMap<String, Vec<CausalRepoReflog>>>,
    sitelogs: RwLock<HashMap<String, Vec<CausalRepoSitelog>>>,
    settings: RwLock<HashMap<String, CausalRepoBranchSettings>>,
}

impl MemoryCausalRepoStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects stored by hash.
    pub fn object_count(&self) -> StoreResult<usize> {
        Ok(read(&self.objects)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StoreError::LockPoisoned(e.to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StoreError::LockPoisoned(e.to_string()))
}

impl CausalRepoStore for MemoryCausalRepoStore {
    fn get_objects(&self, hashes: &[ObjectId]) -> StoreResult<Vec<Option<CausalRepoObject>>> {
        let objects = read(&self.objects)?;
        Ok(hashes.iter().map(|h| objects.get(h).cloned()).collect())
    }

    fn store_objects(&self, objects: &[CausalRepoObject]) -> StoreResult<()> {
        let mut map = write(&self.objects)?;
        for object in objects {
            if let CausalRepoObject::Branch(branch) = object {
                warn!(branch = %branch.name, "branch passed to store_objects; use save_branch");
                continue;
            }
            let hash = object.hash();
            debug!(kind = %object.kind(), hash = %hash.short_hex(), "stored object");
            map.insert(hash, object.clone());
        }
        Ok(())
    }

    fn get_branches(&self, prefix: &str) -> StoreResult<Vec<CausalRepoBranch>> {
        let branches = read(&self.branches)?;
        Ok(filter_branches(branches.values(), prefix))
    }

    fn save_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()> {
        write(&self.branches)?.insert(branch.name.clone(), branch.clone());
        Ok(())
    }

    fn delete_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()> {
        write(&self.branches)?.remove(&branch.name);
        Ok(())
    }

    fn append_reflog(&self, reflog: &CausalRepoReflog) -> StoreResult<()> {
        write(&self.reflogs)?
            .entry(reflog.branch.clone())
            .or_default()
            .push(reflog.clone());
        Ok(())
    }

    fn get_reflog(&self, branch: &str) -> StoreResult<Vec<CausalRepoReflog>> {
        Ok(read(&self.reflogs)?
            .get(branch)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn append_sitelog(&self, sitelog: &CausalRepoSitelog) -> StoreResult<()> {
        write(&self.sitelogs)?
            .entry(sitelog.branch.clone())
            .or_default()
            .push(sitelog.clone());
        Ok(())
    }

    fn get_sitelog(&self, branch: &str) -> StoreResult<Vec<CausalRepoSitelog>> {
        Ok(read(&self.sitelogs)?
            .get(branch)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn save_branch_settings(&self, settings: &CausalRepoBranchSettings) -> StoreResult<()> {
        write(&self.settings)?.insert(settings.branch.clone(), settings.clone());
        Ok(())
    }

    fn get_branch_settings(&self, branch: &str) -> StoreResult<Option<CausalRepoBranchSettings>> {
        Ok(read(&self.settings)?.get(branch).cloned())
    }
}
