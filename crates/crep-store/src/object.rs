use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crep_crypto::{ChainLink, ContentHasher};
use crep_index::AtomIndex;
use crep_types::{ObjectId, SiteId};
use crep_weave::Atom;

use crate::error::StoreResult;

/// The kind of a repository object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Branch,
    Commit,
    Index,
    Atom,
    Reflog,
    Sitelog,
    BranchSettings,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Commit => write!(f, "commit"),
            Self::Index => write!(f, "index"),
            Self::Atom => write!(f, "atom"),
            Self::Reflog => write!(f, "reflog"),
            Self::Sitelog => write!(f, "sitelog"),
            Self::BranchSettings => write!(f, "branch_settings"),
        }
    }
}

/// Everything a repository persists, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CausalRepoObject {
    Branch(CausalRepoBranch),
    Commit(CausalRepoCommit),
    Index { data: AtomIndex },
    Atom { data: Atom },
    Reflog(CausalRepoReflog),
    Sitelog(CausalRepoSitelog),
    BranchSettings(CausalRepoBranchSettings),
}

impl CausalRepoObject {
    pub fn index(data: AtomIndex) -> Self {
        Self::Index { data }
    }

    pub fn atom(data: Atom) -> Self {
        Self::Atom { data }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Branch(_) => ObjectKind::Branch,
            Self::Commit(_) => ObjectKind::Commit,
            Self::Index { .. } => ObjectKind::Index,
            Self::Atom { .. } => ObjectKind::Atom,
            Self::Reflog(_) => ObjectKind::Reflog,
            Self::Sitelog(_) => ObjectKind::Sitelog,
            Self::BranchSettings(_) => ObjectKind::BranchSettings,
        }
    }

    /// The hash this object is stored under.
    ///
    /// For a branch this is the hash it points at, since branches are keyed
    /// by name rather than by their own content.
    pub fn hash(&self) -> ObjectId {
        match self {
            Self::Branch(b) => b.hash,
            Self::Commit(c) => c.hash,
            Self::Index { data } => data.hash,
            Self::Atom { data } => data.hash,
            Self::Reflog(r) => r.hash,
            Self::Sitelog(s) => s.hash,
            Self::BranchSettings(s) => s.hash,
        }
    }

    pub fn as_branch(&self) -> Option<&CausalRepoBranch> {
        match self {
            Self::Branch(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&CausalRepoCommit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<&AtomIndex> {
        match self {
            Self::Index { data } => Some(data),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Self::Atom { data } => Some(data),
            _ => None,
        }
    }

    pub fn into_atom(self) -> Option<Atom> {
        match self {
            Self::Atom { data } => Some(data),
            _ => None,
        }
    }
}

impl From<CausalRepoCommit> for CausalRepoObject {
    fn from(commit: CausalRepoCommit) -> Self {
        Self::Commit(commit)
    }
}

impl From<AtomIndex> for CausalRepoObject {
    fn from(index: AtomIndex) -> Self {
        Self::index(index)
    }
}

impl From<Atom> for CausalRepoObject {
    fn from(atom: Atom) -> Self {
        Self::atom(atom)
    }
}

/// The key an object is stored under. See [`CausalRepoObject::hash`].
pub fn get_object_hash(object: &CausalRepoObject) -> ObjectId {
    object.hash()
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
fn iso_millis(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// A named, mutable pointer to a commit or index hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalRepoBranch {
    pub name: String,
    pub hash: ObjectId,
    pub time: DateTime<Utc>,
}

impl CausalRepoBranch {
    pub fn new(name: impl Into<String>, hash: ObjectId, time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            hash,
            time,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// An immutable snapshot record chained to its predecessor.
///
/// `hash` covers the message, the time, the index hash and the previous
/// commit's hash, so rewriting any commit changes every hash after it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalRepoCommit {
    pub hash: ObjectId,
    pub message: String,
    pub time: DateTime<Utc>,
    pub index: ObjectId,
    pub previous_commit: Option<ObjectId>,
}

impl CausalRepoCommit {
    /// Build a commit of `index` on top of `previous`.
    ///
    /// `time` is truncated to milliseconds so the stored time and the hashed
    /// time always agree.
    pub fn new(
        message: impl Into<String>,
        time: DateTime<Utc>,
        index: ObjectId,
        previous: Option<&CausalRepoCommit>,
    ) -> StoreResult<Self> {
        let message = message.into();
        let time = time.trunc_subsecs(3);
        let previous_commit = previous.map(|c| c.hash);
        let hash = commit_hash(&message, &time, &index, previous_commit.as_ref())?;
        Ok(Self {
            hash,
            message,
            time,
            index,
            previous_commit,
        })
    }

    /// Returns `true` if the stored hash matches the commit's fields.
    pub fn verify(&self) -> bool {
        self.recompute_hash() == self.hash
    }
}

#[derive(Serialize)]
struct CommitHashInput<'a> {
    message: &'a str,
    time: String,
    index: &'a ObjectId,
    previous_commit: Option<&'a ObjectId>,
}

fn commit_hash(
    message: &str,
    time: &DateTime<Utc>,
    index: &ObjectId,
    previous_commit: Option<&ObjectId>,
) -> StoreResult<ObjectId> {
    Ok(ContentHasher::COMMIT.hash_json(&CommitHashInput {
        message,
        time: iso_millis(time),
        index,
        previous_commit,
    })?)
}

impl ChainLink for CausalRepoCommit {
    fn link_hash(&self) -> ObjectId {
        self.hash
    }

    fn previous_hash(&self) -> Option<ObjectId> {
        self.previous_commit
    }

    fn recompute_hash(&self) -> ObjectId {
        commit_hash(
            &self.message,
            &self.time,
            &self.index,
            self.previous_commit.as_ref(),
        )
        .unwrap_or_else(|_| ObjectId::null())
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// A historical value of a branch pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalRepoReflog {
    pub hash: ObjectId,
    pub branch: String,
    /// The hash the branch pointed at.
    pub target: ObjectId,
    pub time: DateTime<Utc>,
}

impl CausalRepoReflog {
    pub fn new(branch: &CausalRepoBranch, time: DateTime<Utc>) -> StoreResult<Self> {
        let time = time.trunc_subsecs(3);
        let hash = ContentHasher::REFLOG.hash_json(&(
            &branch.name,
            &branch.hash,
            iso_millis(&time),
        ))?;
        Ok(Self {
            hash,
            branch: branch.name.clone(),
            target: branch.hash,
            time,
        })
    }
}

/// Whether a site started or stopped watching a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitelogKind {
    Watch,
    Unwatch,
}

/// Why a site's watch state changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SitelogReason {
    UserAction,
    ConnectionLost,
}

/// A record of a site watching or unwatching a branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalRepoSitelog {
    pub hash: ObjectId,
    pub branch: String,
    pub site: SiteId,
    pub kind: SitelogKind,
    pub reason: SitelogReason,
    pub time: DateTime<Utc>,
}

impl CausalRepoSitelog {
    pub fn new(
        branch: impl Into<String>,
        site: SiteId,
        kind: SitelogKind,
        reason: SitelogReason,
        time: DateTime<Utc>,
    ) -> StoreResult<Self> {
        let branch = branch.into();
        let time = time.trunc_subsecs(3);
        let hash = ContentHasher::SITELOG.hash_json(&(
            &branch,
            &site,
            kind,
            reason,
            iso_millis(&time),
        ))?;
        Ok(Self {
            hash,
            branch,
            site,
            kind,
            reason,
            time,
        })
    }
}

/// Per-branch settings. Only the latest record for a branch is in effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalRepoBranchSettings {
    pub hash: ObjectId,
    pub branch: String,
    pub password_hash: Option<String>,
    pub time: DateTime<Utc>,
}

impl CausalRepoBranchSettings {
    pub fn new(
        branch: impl Into<String>,
        password_hash: Option<String>,
        time: DateTime<Utc>,
    ) -> StoreResult<Self> {
        let branch = branch.into();
        let time = time.trunc_subsecs(3);
        let hash = ContentHasher::SETTINGS.hash_json(&(
            &branch,
            &password_hash,
            iso_millis(&time),
        ))?;
        Ok(Self {
            hash,
            branch,
            password_hash,
            time,
        })
    }
}
