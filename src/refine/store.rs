//! Session directory: the `best` and `candidate` slots plus run history.

use super::report::RefinementReport;
use crate::errors::ConfigError;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub const BEST_SLOT: &str = "best";
pub const CANDIDATE_SLOT: &str = "candidate";
pub const HISTORY_FILE: &str = "history.json";
const LOCK_FILE: &str = ".lock";

/// Exclusive handle on one session directory.
///
/// Holds an advisory lock on `.lock` until dropped. Every write goes to a
/// temporary file first and is renamed into place, so a slot never holds a
/// partial value.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    lock: File,
}

impl SessionStore {
    pub fn open(dir: &Path) -> Result<Self, ConfigError> {
        let store_err = |source: io::Error| ConfigError::Store {
            path: dir.to_path_buf(),
            source,
        };

        fs::create_dir_all(dir).map_err(store_err)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))
            .map_err(store_err)?;

        lock.try_lock_exclusive()
            .map_err(|_| ConfigError::SessionLocked {
                path: dir.to_path_buf(),
            })?;

        tracing::debug!(dir = %dir.display(), "session store locked");
        Ok(Self {
            dir: dir.to_path_buf(),
            lock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_atomic(&self, name: &str, contents: &str) -> io::Result<()> {
        let tmp = self.dir.join(format!(".{}.tmp", name));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, self.dir.join(name))
    }

    pub fn write_best(&self, artifact: &str) -> io::Result<()> {
        self.write_atomic(BEST_SLOT, artifact)
    }

    pub fn write_candidate(&self, artifact: &str) -> io::Result<()> {
        self.write_atomic(CANDIDATE_SLOT, artifact)
    }

    pub fn read_best(&self) -> io::Result<String> {
        fs::read_to_string(self.dir.join(BEST_SLOT))
    }

    pub fn read_candidate(&self) -> io::Result<String> {
        fs::read_to_string(self.dir.join(CANDIDATE_SLOT))
    }

    pub fn write_history(&self, report: &RefinementReport) -> io::Result<()> {
        let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
        self.write_atomic(HISTORY_FILE, &json)
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}

/// Read `history.json` from a session directory without taking the lock.
pub fn load_history(dir: &Path) -> Result<RefinementReport> {
    let path = dir.join(HISTORY_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read history: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history: {}", path.display()))
}
