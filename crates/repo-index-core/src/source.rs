//! Revision source abstraction.
//!
//! A [`RevisionSource`] lists the files at a revision, reads their bytes,
//! and reports which paths changed between two revisions. Answers must be
//! deterministic for a fixed revision identifier.
//!
//! [`MemoryRevisionSource`] holds revisions as in-memory snapshots and is
//! used by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::FileEntry;

#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Every file at `revision` with its size. Eligibility filtering is the
    /// caller's job.
    async fn list_files(&self, revision: &str) -> Result<Vec<FileEntry>>;

    /// Raw bytes of `path` at `revision`, or `None` if it does not exist
    /// there.
    async fn read_content(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Paths added, modified, or removed between `from` and `to`.
    async fn changed_paths(&self, from: &str, to: &str) -> Result<BTreeSet<String>>;
}

/// In-memory revision snapshots.
#[derive(Default)]
pub struct MemoryRevisionSource {
    revisions: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    unreadable: RwLock<HashSet<String>>,
    /// Overrides for [`RevisionSource::changed_paths`], keyed by `(from, to)`.
    changed_overrides: RwLock<HashMap<(String, String), BTreeSet<String>>>,
}

impl MemoryRevisionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision as a list of `(path, content)` pairs.
    pub fn insert_revision<P, C>(&self, revision: &str, files: impl IntoIterator<Item = (P, C)>)
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let snapshot = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        self.revisions
            .write()
            .unwrap()
            .insert(revision.to_string(), snapshot);
    }

    /// Make every read of `path` fail, as if the backing object were
    /// corrupt or vanished between listing and reading.
    pub fn fail_reads_for(&self, path: &str) {
        self.unreadable.write().unwrap().insert(path.to_string());
    }

    /// Report exactly `paths` as changed between `from` and `to`.
    pub fn set_changed_paths<S: Into<String>>(
        &self,
        from: &str,
        to: &str,
        paths: impl IntoIterator<Item = S>,
    ) {
        self.changed_overrides.write().unwrap().insert(
            (from.to_string(), to.to_string()),
            paths.into_iter().map(Into::into).collect(),
        );
    }

    fn snapshot(&self, revision: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        self.revisions
            .read()
            .unwrap()
            .get(revision)
            .cloned()
            .ok_or_else(|| anyhow!("unknown revision: {}", revision))
    }
}

#[async_trait]
impl RevisionSource for MemoryRevisionSource {
    async fn list_files(&self, revision: &str) -> Result<Vec<FileEntry>> {
        Ok(self
            .snapshot(revision)?
            .iter()
            .map(|(path, content)| FileEntry {
                path: path.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn read_content(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>> {
        if self.unreadable.read().unwrap().contains(path) {
            bail!("read failed for {}", path);
        }
        Ok(self.snapshot(revision)?.get(path).cloned())
    }

    async fn changed_paths(&self, from: &str, to: &str) -> Result<BTreeSet<String>> {
        if let Some(paths) = self
            .changed_overrides
            .read()
            .unwrap()
            .get(&(from.to_string(), to.to_string()))
        {
            return Ok(paths.clone());
        }
        let old = self.snapshot(from)?;
        let new = self.snapshot(to)?;
        let mut changed: BTreeSet<String> = old
            .iter()
            .filter(|(path, content)| new.get(*path) != Some(content))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(new.keys().filter(|p| !old.contains_key(*p)).cloned());
        Ok(changed)
    }
}
