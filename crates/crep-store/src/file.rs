//! Durable store keeping every record as JSON under one root directory.
//!
//! On-disk layout:
//! ```text
//! <root>/objects/<2 hex>/<62 hex>.json   objects, keyed by hash
//! <root>/branches/<hex(name)>.json       one file per branch
//! <root>/settings/<hex(name)>.json       latest settings per branch
//! <root>/reflog/<hex(name)>.jsonl        append-only, oldest first
//! <root>/sitelog/<hex(name)>.jsonl       append-only, oldest first
//! ```
//!
//! Whole-file records are written to a temporary file in the target
//! directory and renamed into place, so readers never observe a partial
//! object. Log lines that fail to parse (a torn final append) are skipped.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crep_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{
    CausalRepoBranch, CausalRepoBranchSettings, CausalRepoObject, CausalRepoReflog,
    CausalRepoSitelog,
};
use crate::traits::{filter_branches, CausalRepoStore};

const OBJECTS_DIR: &str = "objects";
const BRANCHES_DIR: &str = "branches";
const SETTINGS_DIR: &str = "settings";
const REFLOG_DIR: &str = "reflog";
const SITELOG_DIR: &str = "sitelog";

/// A [`CausalRepoStore`] backed by JSON files.
#[derive(Debug)]
pub struct FileCausalRepoStore {
    root: PathBuf,
    /// Serializes appends so concurrent log lines never interleave.
    log_lock: Mutex<()>,
}

impl FileCausalRepoStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [OBJECTS_DIR, BRANCHES_DIR, SETTINGS_DIR, REFLOG_DIR, SITELOG_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            log_lock: Mutex::new(()),
        })
    }

    /// The directory this store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, hash: &ObjectId) -> PathBuf {
        let hex = hash.to_hex();
        let (fanout, rest) = hex.split_at(2);
        self.root
            .join(OBJECTS_DIR)
            .join(fanout)
            .join(format!("{rest}.json"))
    }

    fn named_path(&self, dir: &str, name: &str, extension: &str) -> PathBuf {
        self.root
            .join(dir)
            .join(format!("{}.{extension}", hex::encode(name.as_bytes())))
    }

    fn append_line<T: Serialize>(&self, path: &Path, record: &T) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = self
            .log_lock
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Write `record` to `path` via a temporary file and an atomic rename.
fn write_atomic<T: Serialize>(path: &Path, record: &T) -> StoreResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, record)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Read a whole-file record. A missing file is `None`.
fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        warn!(path = %path.display(), error = %e, "corrupt record on disk");
        StoreError::Corrupt {
            location: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Read a JSON-lines log, newest entry first.
fn read_log<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = number + 1, error = %e, "skipping corrupt log line");
            }
        }
    }
    entries.reverse();
    Ok(entries)
}

impl CausalRepoStore for FileCausalRepoStore {
    fn get_objects(&self, hashes: &[ObjectId]) -> StoreResult<Vec<Option<CausalRepoObject>>> {
        hashes
            .iter()
            .map(|hash| read_record(&self.object_path(hash)))
            .collect()
    }

    fn store_objects(&self, objects: &[CausalRepoObject]) -> StoreResult<()> {
        for object in objects {
            if let CausalRepoObject::Branch(branch) = object {
                warn!(branch = %branch.name, "branch passed to store_objects; use save_branch");
                continue;
            }
            let hash = object.hash();
            let path = self.object_path(&hash);
            if path.exists() {
                continue;
            }
            write_atomic(&path, object)?;
            debug!(kind = %object.kind(), hash = %hash.short_hex(), "stored object");
        }
        Ok(())
    }

    fn get_branches(&self, prefix: &str) -> StoreResult<Vec<CausalRepoBranch>> {
        let mut branches = Vec::new();
        for entry in fs::read_dir(self.root.join(BRANCHES_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record::<CausalRepoBranch>(&path) {
                Ok(Some(branch)) => branches.push(branch),
                Ok(None) => {}
                // Already logged; one bad file must not hide the others.
                Err(StoreError::Corrupt { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filter_branches(&branches, prefix))
    }

    fn save_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()> {
        write_atomic(&self.named_path(BRANCHES_DIR, &branch.name, "json"), branch)
    }

    fn delete_branch(&self, branch: &CausalRepoBranch) -> StoreResult<()> {
        match fs::remove_file(self.named_path(BRANCHES_DIR, &branch.name, "json")) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn append_reflog(&self, reflog: &CausalRepoReflog) -> StoreResult<()> {
        self.append_line(&self.named_path(REFLOG_DIR, &reflog.branch, "jsonl"), reflog)
    }

    fn get_reflog(&self, branch: &str) -> StoreResult<Vec<CausalRepoReflog>> {
        read_log(&self.named_path(REFLOG_DIR, branch, "jsonl"))
    }

    fn append_sitelog(&self, sitelog: &CausalRepoSitelog) -> StoreResult<()> {
        self.append_line(&self.named_path(SITELOG_DIR, &sitelog.branch, "jsonl"), sitelog)
    }

    fn get_sitelog(&self, branch: &str) -> StoreResult<Vec<CausalRepoSitelog>> {
        read_log(&self.named_path(SITELOG_DIR, branch, "jsonl"))
    }

    fn save_branch_settings(&self, settings: &CausalRepoBranchSettings) -> StoreResult<()> {
        write_atomic(
            &self.named_path(SETTINGS_DIR, &settings.branch, "json"),
            settings,
        )
    }

    fn get_branch_settings(&self, branch: &str) -> StoreResult<Option<CausalRepoBranchSettings>> {
        read_record(&self.named_path(SETTINGS_DIR, branch, "json"))
    }
}
