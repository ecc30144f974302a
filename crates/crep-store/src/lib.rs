//! Object model and persistence for the causal repo.
//!
//! Everything a repository persists is a [`CausalRepoObject`]: atoms,
//! indexes and commits are immutable and addressed by their content hash,
//! while a branch is a mutable name-to-hash pointer. Reflog, sitelog and
//! branch-settings records form the audit trail.
//!
//! [`CausalRepoStore`] is the narrow persistence boundary. Two backends
//! implement it with identical contracts:
//!
//! - [`MemoryCausalRepoStore`]: maps behind `RwLock`s, for tests and
//!   ephemeral sessions
//! - [`FileCausalRepoStore`]: JSON files under a root directory

pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileCausalRepoStore;
pub use memory::MemoryCausalRepoStore;
pub use object::{
    get_object_hash, CausalRepoBranch, CausalRepoBranchSettings, CausalRepoCommit,
    CausalRepoObject, CausalRepoReflog, CausalRepoSitelog, ObjectKind, SitelogKind,
    SitelogReason,
};
pub use traits::CausalRepoStore;
