//! A local weave kept in step with one remote branch.

use tracing::{debug, warn};

use crep_types::ObjectId;
use crep_weave::{Atom, AtomRejection, ImportResult, Weave};

use crate::client::{BranchUpdate, CausalRepoClient};
use crate::connection::ConnectionClient;
use crate::error::ClientResult;
use crate::subscription::Subscription;

/// Outcome of applying one inbound `atoms` update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyResult {
    /// Atoms now in the weave, including buffered ones this update unblocked.
    pub added: Vec<Atom>,
    /// Atoms refused for good, e.g. a bad checksum or a second root.
    pub rejected: Vec<AtomRejection<serde_json::Value>>,
    /// Hashes the server reported removed. The weave never drops atoms, so
    /// these are passed through for the caller.
    pub removed: Vec<ObjectId>,
    /// Atoms still waiting for their cause.
    pub buffered: usize,
    /// Buffered atoms given up on because the buffer passed
    /// [`ClientConfig::orphan_limit`], oldest first. Non-empty means this
    /// weave is out of step with the branch.
    ///
    /// [`ClientConfig::orphan_limit`]: crate::ClientConfig::orphan_limit
    pub abandoned: Vec<Atom>,
}

/// One branch's weave plus the client that feeds it.
///
/// Inbound atoms whose cause has not arrived are buffered and retried on
/// every later update, up to the client's `orphan_limit`. Locally inserted atoms go into the weave first and
/// are then sent through [`CausalRepoClient::add_atoms`].
pub struct RemoteWeave<C> {
    client: CausalRepoClient<C>,
    branch: String,
    weave: Weave,
    orphans: Vec<Atom>,
}

impl<C: ConnectionClient> RemoteWeave<C> {
    pub fn new(client: CausalRepoClient<C>, branch: impl Into<String>) -> Self {
        Self {
            client,
            branch: branch.into(),
            weave: Weave::new(),
            orphans: Vec::new(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn weave(&self) -> &Weave {
        &self.weave
    }

    /// Atoms received before their cause.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Remove and return every buffered atom.
    pub fn take_orphans(&mut self) -> Vec<Atom> {
        std::mem::take(&mut self.orphans)
    }

    /// Start watching the branch this weave mirrors.
    pub fn watch(&self) -> Subscription<BranchUpdate> {
        self.client.watch_branch(&self.branch)
    }

    /// Apply one update from [`RemoteWeave::watch`]. Actions are not weave
    /// content and yield `None`.
    pub fn apply_update(&mut self, update: BranchUpdate) -> Option<ApplyResult> {
        match update {
            BranchUpdate::Atoms {
                atoms,
                removed_atoms,
            } => {
                let mut result = self.apply(atoms);
                result.removed = removed_atoms;
                Some(result)
            }
            // Re-watching replays the branch as ordinary atom updates, and
            // re-importing known atoms is a no-op.
            BranchUpdate::Event { .. } | BranchUpdate::Resync { .. } => None,
        }
    }

    /// Insert remote atoms in any order.
    pub fn apply(&mut self, atoms: Vec<Atom>) -> ApplyResult {
        let offered = std::mem::take(&mut self.orphans).into_iter().chain(atoms);
        let ImportResult { added, rejected } = self.weave.import_all(offered);

        let mut result = ApplyResult {
            added,
            ..ApplyResult::default()
        };
        for rejection in rejected {
            if rejection.reason.is_retryable() {
                self.orphans.push(rejection.atom);
            } else {
                warn!(branch = %self.branch, atom = %rejection.atom.id, reason = %rejection.reason, "remote atom rejected");
                result.rejected.push(rejection);
            }
        }
        let limit = self.client.config().orphan_limit;
        if self.orphans.len() > limit {
            let excess = self.orphans.len() - limit;
            result.abandoned = self.orphans.drain(..excess).collect();
            warn!(
                branch = %self.branch,
                abandoned = excess,
                limit,
                "orphan buffer full; weave is out of step with the branch"
            );
        }
        result.buffered = self.orphans.len();
        debug!(
            branch = %self.branch,
            added = result.added.len(),
            buffered = result.buffered,
            "applied remote atoms"
        );
        result
    }

    /// Insert atoms authored here and send the accepted ones to the branch.
    /// Refused atoms are returned and not sent.
    pub fn insert_local(&mut self, atoms: Vec<Atom>) -> ClientResult<ImportResult<serde_json::Value>> {
        let result = self.weave.insert_many(atoms);
        if !result.added.is_empty() {
            self.client
                .add_atoms(&self.branch, result.added.clone(), Vec::new())?;
        }
        Ok(result)
    }
}
