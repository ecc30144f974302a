use thiserror::Error;

use crep_crypto::ChainError;
use crep_store::{ObjectKind, StoreError};
use crep_types::ObjectId;
use crep_weave::WeaveError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("no branch checked out")]
    NoBranch,

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("object {hash} is a {found}, expected a {expected}")]
    UnexpectedObject {
        hash: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("atom {atom} does not fit the weave: {reason}")]
    AtomRejected { atom: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("weave error: {0}")]
    Weave(#[from] WeaveError),

    #[error("history is broken: {0}")]
    History(#[from] ChainError),
}

pub type RepoResult<T> = Result<T, RepoError>;
