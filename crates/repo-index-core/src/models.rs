//! Core data models shared by the reconciliation pipeline.
//!
//! [`FileRecord`]s and [`Chunk`]s are rebuilt on every pass from the
//! revision source and never persisted by the engine itself.
//! [`IndexedFileState`] is what the index store currently believes about a
//! collection; the engine only reads it and proposes deltas.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A path listed by a revision source, before fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Revision-relative, forward-slash path.
    pub path: String,
    /// Size of the file content in bytes.
    pub size: u64,
}

/// An eligible file at the target revision together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the raw file bytes.
    pub fingerprint: String,
}

/// One path currently represented in the persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFileState {
    pub path: String,
    pub fingerprint: String,
}

/// A bounded span of a file's text.
///
/// Identity is `(source_path, ordinal)` and only holds within one chunking
/// pass. A changed file's previous chunks are deleted wholesale before new
/// ones are inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_path: String,
    /// Zero-based, dense, in document order.
    pub ordinal: usize,
    pub text: String,
    pub byte_length: usize,
}

/// A chunk ready for insertion, tagged with the fingerprint of the file it
/// was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub file_hash: String,
}

impl ChunkRecord {
    pub fn file_path(&self) -> &str {
        &self.chunk.source_path
    }
}

/// How the comparison set of a pass was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// The entire eligible tree is compared against every stored fingerprint.
    Full,
    /// Only paths reported as touched since the prior revision are compared.
    Differential,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Differential => f.write_str("differential"),
        }
    }
}

/// Partition of the union of current and indexed paths.
///
/// Every path in the union appears in exactly one set, and
/// `added ∪ modified ∪ unchanged` is the current comparison set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl ChangeSet {
    /// True when the pass has nothing to delete or insert.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Paths that need chunking, in path order.
    pub fn to_index(&self) -> impl Iterator<Item = &String> {
        let mut paths: Vec<&String> = self.added.iter().chain(self.modified.iter()).collect();
        paths.sort();
        paths.into_iter()
    }

    /// Paths whose stored chunks must be removed before anything is inserted.
    ///
    /// Deleted paths come first, then modified ones.
    pub fn to_delete(&self) -> impl Iterator<Item = &String> {
        self.deleted.iter().chain(self.modified.iter())
    }
}

/// Summary of a reconciliation pass.
///
/// When a pass fails part-way, the counters reflect only operations the
/// store acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub files_indexed: u64,
    pub chunks_upserted: u64,
    pub files_removed: u64,
}

impl ReconciliationResult {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files indexed, {} chunks upserted, {} files removed",
            self.files_indexed, self.chunks_upserted, self.files_removed
        )
    }
}
