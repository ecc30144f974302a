//! Repository layer for the causal repo.
//!
//! [`history`] holds the store-level operations: persisting atoms behind
//! an index, loading a branch, moving a branch with a reflog entry, walking
//! and verifying commit history, and diffing two commits.
//!
//! [`CausalRepo`] is a working copy of one branch built on those: stage
//! atom additions and removals, then commit them as a new index and commit.

pub mod error;
pub mod history;
pub mod repo;

pub use error::{RepoError, RepoResult};
pub use history::{
    calculate_commit_diff, list_commits, load_atoms, load_branch, load_index, store_atoms,
    update_branch, verify_history, CommitDiff, LoadedBranch,
};
pub use repo::CausalRepo;
