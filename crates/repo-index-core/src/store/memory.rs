//! In-memory [`IndexStore`] implementation for tests.
//!
//! Chunks live in a `BTreeMap` per collection behind `std::sync::RwLock`.
//! Every acknowledged operation is appended to an operation log so tests
//! can assert on ordering and minimality, and individual operation kinds
//! can be made to fail.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{ChunkRecord, IndexedFileState};

use super::{FingerprintPage, IndexStore, PageToken};

/// An acknowledged store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(String),
    Fetch(String),
    Delete { collection: String, path: String },
    /// One entry per inserted chunk, holding its file path.
    Insert { collection: String, paths: Vec<String> },
    Drop(String),
}

#[derive(Default)]
struct Failures {
    deletes: bool,
    fetches: bool,
    /// Inserts succeed this many more times, then fail.
    inserts_after: Option<usize>,
}

type Collection = BTreeMap<(String, usize), ChunkRecord>;

/// In-memory index store.
#[derive(Default)]
pub struct InMemoryIndexStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    ops: RwLock<Vec<StoreOp>>,
    failures: RwLock<Failures>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.ops.read().unwrap().clone()
    }

    pub fn clear_operations(&self) {
        self.ops.write().unwrap().clear();
    }

    /// Operations that mutate the store, in order.
    pub fn mutations(&self) -> Vec<StoreOp> {
        self.operations()
            .into_iter()
            .filter(|op| matches!(op, StoreOp::Delete { .. } | StoreOp::Insert { .. } | StoreOp::Drop(_)))
            .collect()
    }

    pub fn fail_deletes(&self) {
        self.failures.write().unwrap().deletes = true;
    }

    pub fn fail_fetches(&self) {
        self.failures.write().unwrap().fetches = true;
    }

    pub fn fail_inserts_after(&self, successes: usize) {
        self.failures.write().unwrap().inserts_after = Some(successes);
    }

    /// Stored fingerprint for `path`, if any chunk of it is stored.
    pub fn fingerprint_of(&self, collection: &str, path: &str) -> Option<String> {
        self.chunks_for(collection, path)
            .first()
            .map(|c| c.file_hash.clone())
    }

    pub fn chunks_for(&self, collection: &str, path: &str) -> Vec<ChunkRecord> {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|chunks| {
                chunks
                    .values()
                    .filter(|c| c.file_path() == path)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct stored paths, sorted.
    pub fn paths(&self, collection: &str) -> Vec<String> {
        let collections = self.collections.read().unwrap();
        let mut paths: Vec<String> = collections
            .get(collection)
            .map(|chunks| chunks.keys().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default();
        paths.dedup();
        paths
    }

    pub fn chunk_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn record(&self, op: StoreOp) {
        self.ops.write().unwrap().push(op);
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let exists = self.collections.read().unwrap().contains_key(collection);
        self.record(StoreOp::Exists(collection.to_string()));
        Ok(exists)
    }

    async fn fetch_fingerprints(
        &self,
        collection: &str,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<FingerprintPage> {
        if self.failures.read().unwrap().fetches {
            bail!("fingerprint fetch rejected for {}", collection);
        }
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        if let Some(chunks) = self.collections.read().unwrap().get(collection) {
            for ((path, _), chunk) in chunks {
                latest
                    .entry(path.clone())
                    .or_insert_with(|| chunk.file_hash.clone());
            }
        }

        let after = page.map(|t| t.0.as_str());
        let mut remaining = latest
            .into_iter()
            .filter(|(path, _)| after.map_or(true, |a| path.as_str() > a));
        let entries: Vec<IndexedFileState> = remaining
            .by_ref()
            .take(limit)
            .map(|(path, fingerprint)| IndexedFileState { path, fingerprint })
            .collect();
        let next = match (remaining.next(), entries.last()) {
            (Some(_), Some(last)) => Some(PageToken(last.path.clone())),
            _ => None,
        };

        self.record(StoreOp::Fetch(collection.to_string()));
        Ok(FingerprintPage { entries, next })
    }

    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()> {
        if self.failures.read().unwrap().deletes {
            bail!("delete rejected for {}", path);
        }
        if let Some(chunks) = self.collections.write().unwrap().get_mut(collection) {
            chunks.retain(|(p, _), _| p != path);
        }
        self.record(StoreOp::Delete {
            collection: collection.to_string(),
            path: path.to_string(),
        });
        Ok(())
    }

    async fn insert_chunks(&self, collection: &str, chunks: &[ChunkRecord]) -> Result<()> {
        {
            let mut failures = self.failures.write().unwrap();
            match failures.inserts_after {
                Some(0) => bail!("insert rejected for {}", collection),
                Some(ref mut n) => *n -= 1,
                None => {}
            }
        }
        {
            let mut collections = self.collections.write().unwrap();
            let stored = collections.entry(collection.to_string()).or_default();
            for c in chunks {
                stored.insert((c.chunk.source_path.clone(), c.chunk.ordinal), c.clone());
            }
        }
        self.record(StoreOp::Insert {
            collection: collection.to_string(),
            paths: chunks.iter().map(|c| c.chunk.source_path.clone()).collect(),
        });
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().unwrap().remove(collection);
        self.record(StoreOp::Drop(collection.to_string()));
        Ok(())
    }
}
