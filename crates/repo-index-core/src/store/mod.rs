//! Index store abstraction.
//!
//! The [`IndexStore`] trait is the engine's only view of the persisted
//! index. The store is the durable source of truth for which files a
//! collection holds and at which fingerprint; the engine reads that state
//! at the start of a pass and never caches it across passes.
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! every mutation must be idempotent: deleting an unknown path succeeds.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, IndexedFileState};

/// Opaque continuation token for [`IndexStore::fetch_fingerprints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of stored fingerprints.
#[derive(Debug, Clone, Default)]
pub struct FingerprintPage {
    /// One entry per distinct path on this page.
    pub entries: Vec<IndexedFileState>,
    /// `None` once the last page has been returned.
    pub next: Option<PageToken>,
}

/// Abstract index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](IndexStore::collection_exists) | Has this collection ever been written? |
/// | [`fetch_fingerprints`](IndexStore::fetch_fingerprints) | Page through `(path, fingerprint)` pairs |
/// | [`delete_by_path`](IndexStore::delete_by_path) | Remove every chunk stored for a path |
/// | [`insert_chunks`](IndexStore::insert_chunks) | Store a batch of chunks |
/// | [`drop_collection`](IndexStore::drop_collection) | Remove a collection entirely |
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Fetch up to `limit` distinct paths, starting after `page`.
    async fn fetch_fingerprints(
        &self,
        collection: &str,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<FingerprintPage>;

    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()>;

    /// Insert chunks, creating the collection if needed.
    async fn insert_chunks(&self, collection: &str, chunks: &[ChunkRecord]) -> Result<()>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;
}
