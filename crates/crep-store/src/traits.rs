use chrono::{DateTime, Utc};

use crep_types::{ObjectId, SiteId};

use crate::error::StoreResult;
use crate::object::{
    CausalRepoBranch, CausalRepoBranchSettings, CausalRepoObject, CausalRepoReflog,
    CausalRepoSitelog, SitelogKind, SitelogReason,
};

/// Persistence boundary for repository objects, branches and audit logs.
///
/// All implementations must satisfy these invariants:
/// - `store_objects` is an idempotent upsert keyed by the object's hash.
///   Branch objects are not stored this way; use `save_branch`.
/// - A missing object or branch is absent data, never an error.
/// - `get_branches` returns branches whose name starts with the prefix,
///   sorted by name. An empty prefix lists every branch.
/// - Audit logs are append-only; readers see the newest entry first.
pub trait CausalRepoStore: Send + Sync {
    /// Look up objects by hash. The result has one slot per requested hash,
    /// in the same order, with `None` for each miss.
    fn get_objects(&self, hashes: &[ObjectId]) -> StoreResult<Vec<Option<CausalRepoObject>>>;

    /// Upsert objects keyed by their hash.
    fn store_objects(&self, objects: &[CausalRepoObject]) -> StoreResult<()>;

    /// Branches whose name starts with `prefix`, sorted by name.
    fn get_branches(&self, prefix: &str) -> StoreResult<Vec<CausalRepoBranch>>;

    /// Create the branch or replace the one with the same name.
    fn save_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()>;

    /// Remove the branch with this branch's name, if any.
    fn delete_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()>;

    /// Append a reflog entry to the branch's log.
    fn append_reflog(&self, reflog: &CausalRepoReflog) -> StoreResult<()>;

    /// Reflog entries for a branch, newest first.
    fn get_reflog(&self, branch: &str) -> StoreResult<Vec<CausalRepoReflog>>;

    /// Append a sitelog entry to the branch's log.
    fn append_sitelog(&self, sitelog: &CausalRepoSitelog) -> StoreResult<()>;

    /// Sitelog entries for a branch, newest first.
    fn get_sitelog(&self, branch: &str) -> StoreResult<Vec<CausalRepoSitelog>>;

    /// Replace the settings for the settings' branch.
    fn save_branch_settings(&self, settings: &CausalRepoBranchSettings) -> StoreResult<()>;

    /// The settings in effect for a branch.
    fn get_branch_settings(&self, branch: &str) -> StoreResult<Option<CausalRepoBranchSettings>>;

    /// Look up a single object by hash.
    fn get_object(&self, hash: &ObjectId) -> StoreResult<Option<CausalRepoObject>> {
        Ok(self
            .get_objects(std::slice::from_ref(hash))?
            .into_iter()
            .next()
            .flatten())
    }

    /// Look up a branch by exact name.
    fn get_branch(&self, name: &str) -> StoreResult<Option<CausalRepoBranch>> {
        Ok(self
            .get_branches(name)?
            .into_iter()
            .find(|branch| branch.name == name))
    }

    /// Record the branch's current target in its reflog.
    fn log_branch(&self, branch: &CausalRepoBranch) -> StoreResult<CausalRepoReflog> {
        let reflog = CausalRepoReflog::new(branch, Utc::now())?;
        self.append_reflog(&reflog)?;
        Ok(reflog)
    }

    /// Record a site watching or unwatching a branch.
    fn log_site(
        &self,
        branch: &str,
        site: &SiteId,
        kind: SitelogKind,
        reason: SitelogReason,
    ) -> StoreResult<CausalRepoSitelog> {
        self.log_site_at(branch, site, kind, reason, Utc::now())
    }

    /// [`CausalRepoStore::log_site`] with an explicit time.
    fn log_site_at(
        &self,
        branch: &str,
        site: &SiteId,
        kind: SitelogKind,
        reason: SitelogReason,
        time: DateTime<Utc>,
    ) -> StoreResult<CausalRepoSitelog> {
        let sitelog = CausalRepoSitelog::new(branch, site.clone(), kind, reason, time)?;
        self.append_sitelog(&sitelog)?;
        Ok(sitelog)
    }
}

/// Branches matching `prefix`, sorted by name.
pub(crate) fn filter_branches<'a>(
    branches: impl IntoIterator<Item = &'a CausalRepoBranch>,
    prefix: &str,
) -> Vec<CausalRepoBranch> {
    let mut result: Vec<CausalRepoBranch> = branches
        .into_iter()
        .filter(|b| b.name.starts_with(prefix))
        .cloned()
        .collect();
    result.sort_by(|a, b| a.name.cmp(&b.name));
    result
}
