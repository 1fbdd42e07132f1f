//! The reconciliation pass.
//!
//! [`Reconciler::reconcile`] brings one collection of the index store in
//! line with a target revision of a source tree:
//!
//! ```text
//! prior == target? ──yes──▶ {0, 0, 0}
//!        │ no
//!        ▼
//! collection exists? ──▶ page through stored fingerprints
//!        │
//!        ▼
//! list target ─▶ eligibility filter ─▶ (differential: ∩ changed paths)
//!        │
//!        ▼
//! read + fingerprint (bounded concurrency) ─▶ change detection
//!        │
//!        ▼
//! delete stale paths ─▶ chunk added/modified ─▶ insert in batches
//! ```
//!
//! A pass runs in full mode when the collection is new or no prior revision
//! is given, and in differential mode otherwise. Both modes go through the
//! same code; only the comparison set differs.
//!
//! Every delete for a path is acknowledged before any insert is submitted,
//! and unchanged paths never see a store mutation. When a store call fails
//! or the caller cancels, the error carries the counters the store had
//! acknowledged up to that point.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use repo_index_core::chunk::{Chunker, ChunkerConfig};
use repo_index_core::detect;
use repo_index_core::eligibility::{normalize_path, EligibilityFilter};
use repo_index_core::fingerprint::{decode_text, fingerprint};
use repo_index_core::models::{
    ChangeSet, ChunkRecord, FileEntry, FileRecord, IndexedFileState, ReconciliationResult,
    SyncMode,
};
use repo_index_core::source::RevisionSource;
use repo_index_core::store::{IndexStore, PageToken};

use crate::config::Config;
use crate::error::{ReconcileError, StoreOperation};

/// Tunables for a [`Reconciler`], usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub eligibility: EligibilityFilter,
    pub chunker: ChunkerConfig,
    /// Maximum chunks per insert call.
    pub insert_batch_size: usize,
    /// Maximum paths per fingerprint page.
    pub fetch_page_size: usize,
    /// Maximum concurrent content reads.
    pub read_concurrency: usize,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl ReconcilerConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            eligibility: config.indexing.eligibility_filter()?,
            chunker: config.chunking.chunker_config(),
            insert_batch_size: config.indexing.insert_batch_size,
            fetch_page_size: config.indexing.fetch_page_size,
            read_concurrency: config.indexing.read_concurrency,
            store_timeout: config.indexing.store_timeout(),
        })
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            eligibility: EligibilityFilter::default(),
            chunker: ChunkerConfig::default(),
            insert_batch_size: 20,
            fetch_page_size: 250,
            read_concurrency: 8,
            store_timeout: Duration::from_secs(30),
        }
    }
}

/// Arguments of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub collection: String,
    pub target_revision: String,
    /// Last revision successfully indexed into `collection`, if known.
    pub prior_revision: Option<String>,
}

impl ReconcileRequest {
    pub fn new(collection: impl Into<String>, target_revision: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            target_revision: target_revision.into(),
            prior_revision: None,
        }
    }

    pub fn with_prior(mut self, prior_revision: impl Into<String>) -> Self {
        self.prior_revision = Some(prior_revision.into());
        self
    }
}

/// Outcome of the read stage.
#[derive(Default)]
struct ReadSet {
    records: Vec<FileRecord>,
    /// Bytes of files whose fingerprint differs from the stored one.
    contents: HashMap<String, Vec<u8>>,
    /// Listed paths that could not be read this pass.
    skipped: BTreeSet<String>,
}

enum ReadOutcome {
    Read { record: FileRecord, bytes: Option<Vec<u8>> },
    Skipped(String),
}

pub struct Reconciler {
    store: Arc<dyn IndexStore>,
    source: Arc<dyn RevisionSource>,
    config: ReconcilerConfig,
    chunker: Chunker,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn IndexStore>,
        source: Arc<dyn RevisionSource>,
        config: ReconcilerConfig,
    ) -> Self {
        let chunker = Chunker::new(config.chunker);
        Self {
            store,
            source,
            config,
            chunker,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Only operations the store acknowledged are counted. On error the
    /// counters reached so far are available through
    /// [`ReconcileError::partial`].
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationResult, ReconcileError> {
        let collection = request.collection.as_str();
        let target = request.target_revision.as_str();
        let mut result = ReconciliationResult::default();

        if request.prior_revision.as_deref() == Some(target) {
            info!(collection, revision = target, "target already indexed, nothing to do");
            return Ok(result);
        }

        let exists = self
            .store_call(StoreOperation::Exists, &result, cancel, async {
                self.store.collection_exists(collection).await
            })
            .await?;

        let indexed = if exists {
            self.fetch_indexed(collection, &result, cancel).await?
        } else {
            Vec::new()
        };

        let mode = match (&request.prior_revision, exists) {
            (Some(_), true) => SyncMode::Differential,
            _ => SyncMode::Full,
        };
        info!(
            collection,
            revision = target,
            %mode,
            indexed = indexed.len(),
            "starting reconciliation"
        );

        let listed = self
            .source
            .list_files(target)
            .await
            .with_context(|| format!("listing files at {}", target))
            .map_err(ReconcileError::Source)?;
        let eligible: Vec<FileEntry> = listed
            .into_iter()
            .map(|entry| FileEntry {
                path: normalize_path(&entry.path),
                size: entry.size,
            })
            .filter(|entry| {
                let ok = self.config.eligibility.is_eligible(&entry.path, entry.size);
                if !ok {
                    debug!(path = %entry.path, size = entry.size, "not eligible");
                }
                ok
            })
            .collect();

        let (changes, read) = match (mode, request.prior_revision.as_deref()) {
            (SyncMode::Differential, Some(prior)) => {
                let touched: BTreeSet<String> = self
                    .source
                    .changed_paths(prior, target)
                    .await
                    .with_context(|| format!("diffing {}..{}", prior, target))
                    .map_err(ReconcileError::Source)?
                    .iter()
                    .map(|p| normalize_path(p))
                    .collect();
                let eligible_paths: BTreeSet<String> =
                    eligible.iter().map(|e| e.path.clone()).collect();
                let candidates: Vec<FileEntry> = eligible
                    .into_iter()
                    .filter(|e| touched.contains(&e.path))
                    .collect();
                debug!(
                    touched = touched.len(),
                    candidates = candidates.len(),
                    "differential comparison set; renames missed by the diff stay stale until a full pass"
                );
                let read = self.read_files(target, candidates, &indexed).await;
                let changes = detect::detect_differential(
                    &read.records,
                    &indexed,
                    &touched,
                    &eligible_paths,
                    &read.skipped,
                );
                (changes, read)
            }
            _ => {
                let read = self.read_files(target, eligible, &indexed).await;
                let changes = detect::detect_full(&read.records, &indexed, &read.skipped);
                (changes, read)
            }
        };

        info!(
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            unchanged = changes.unchanged.len(),
            skipped = read.skipped.len(),
            "change detection complete"
        );
        if changes.is_noop() {
            return Ok(result);
        }

        self.apply_deletes(collection, &changes, &mut result, cancel)
            .await?;

        let fingerprints: HashMap<&str, &str> = read
            .records
            .iter()
            .map(|r| (r.path.as_str(), r.fingerprint.as_str()))
            .collect();
        let (records, file_ends) = self.chunk_changed(&changes, &read.contents, &fingerprints);

        self.insert_batches(collection, &records, &file_ends, &mut result, cancel)
            .await?;

        info!(
            collection,
            files_indexed = result.files_indexed,
            chunks_upserted = result.chunks_upserted,
            files_removed = result.files_removed,
            "reconciliation complete"
        );
        Ok(result)
    }

    /// Drop `collection` under the same timeout and cancellation as a pass.
    pub async fn drop_collection(
        &self,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let progress = ReconciliationResult::default();
        self.store_call(StoreOperation::Drop, &progress, cancel, async {
            self.store.drop_collection(collection).await
        })
        .await?;
        info!(collection, "collection dropped");
        Ok(())
    }

    /// Page through every stored fingerprint of `collection`.
    async fn fetch_indexed(
        &self,
        collection: &str,
        result: &ReconciliationResult,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexedFileState>, ReconcileError> {
        let mut indexed = Vec::new();
        let mut token: Option<PageToken> = None;
        loop {
            let page = self
                .store_call(StoreOperation::FetchFingerprints, result, cancel, async {
                    self.store
                        .fetch_fingerprints(collection, token.as_ref(), self.config.fetch_page_size)
                        .await
                })
                .await?;
            indexed.extend(page.entries);
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(indexed)
    }

    /// Read and fingerprint `entries`, keeping bytes only for files whose
    /// fingerprint differs from what the store holds.
    async fn read_files(
        &self,
        revision: &str,
        entries: Vec<FileEntry>,
        indexed: &[IndexedFileState],
    ) -> ReadSet {
        let stored: HashMap<&str, &str> = indexed
            .iter()
            .map(|s| (s.path.as_str(), s.fingerprint.as_str()))
            .collect();
        let source = &self.source;
        let stored = &stored;

        let outcomes: Vec<ReadOutcome> = stream::iter(entries)
            .map(|entry| async move {
                match source.read_content(revision, &entry.path).await {
                    Ok(Some(bytes)) => {
                        let fp = fingerprint(&bytes);
                        let changed = stored.get(entry.path.as_str()) != Some(&fp.as_str());
                        ReadOutcome::Read {
                            record: FileRecord {
                                path: entry.path,
                                size: entry.size,
                                fingerprint: fp,
                            },
                            bytes: changed.then_some(bytes),
                        }
                    }
                    Ok(None) => {
                        warn!(path = %entry.path, revision, "listed but not found, skipping");
                        ReadOutcome::Skipped(entry.path)
                    }
                    Err(e) => {
                        warn!(path = %entry.path, revision, error = %e, "read failed, skipping");
                        ReadOutcome::Skipped(entry.path)
                    }
                }
            })
            .buffered(self.config.read_concurrency.max(1))
            .collect()
            .await;

        let mut read = ReadSet::default();
        for outcome in outcomes {
            match outcome {
                ReadOutcome::Read { record, bytes } => {
                    if let Some(bytes) = bytes {
                        read.contents.insert(record.path.clone(), bytes);
                    }
                    read.records.push(record);
                }
                ReadOutcome::Skipped(path) => {
                    read.skipped.insert(path);
                }
            }
        }
        read
    }

    async fn apply_deletes(
        &self,
        collection: &str,
        changes: &ChangeSet,
        result: &mut ReconciliationResult,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        for path in changes.to_delete() {
            self.store_call(StoreOperation::Delete, result, cancel, async {
                self.store.delete_by_path(collection, path).await
            })
            .await?;
            if changes.deleted.contains(path) {
                debug!(path = %path, "removed");
                result.files_removed += 1;
            }
        }
        Ok(())
    }

    /// Chunk every added or modified file.
    ///
    /// Returns the chunk records in path order and, for each file that
    /// produced chunks, the index one past its last record.
    fn chunk_changed(
        &self,
        changes: &ChangeSet,
        contents: &HashMap<String, Vec<u8>>,
        fingerprints: &HashMap<&str, &str>,
    ) -> (Vec<ChunkRecord>, Vec<usize>) {
        let mut records = Vec::new();
        let mut file_ends = Vec::new();
        for path in changes.to_index() {
            let (Some(bytes), Some(file_hash)) =
                (contents.get(path), fingerprints.get(path.as_str()))
            else {
                continue;
            };
            let Some(text) = decode_text(bytes) else {
                debug!(path = %path, "not valid UTF-8, not chunked");
                continue;
            };
            let chunks = self.chunker.chunk(text, path);
            if chunks.is_empty() {
                debug!(path = %path, "no chunks produced");
                continue;
            }
            debug!(path = %path, chunks = chunks.len(), "chunked");
            records.extend(chunks.into_iter().map(|chunk| ChunkRecord {
                chunk,
                file_hash: file_hash.to_string(),
            }));
            file_ends.push(records.len());
        }
        (records, file_ends)
    }

    async fn insert_batches(
        &self,
        collection: &str,
        records: &[ChunkRecord],
        file_ends: &[usize],
        result: &mut ReconciliationResult,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let mut acknowledged = 0;
        let mut completed_files = 0;
        for batch in records.chunks(self.config.insert_batch_size.max(1)) {
            self.store_call(StoreOperation::Insert, result, cancel, async {
                self.store.insert_chunks(collection, batch).await
            })
            .await?;
            acknowledged += batch.len();
            result.chunks_upserted += batch.len() as u64;
            while completed_files < file_ends.len() && file_ends[completed_files] <= acknowledged {
                completed_files += 1;
                result.files_indexed += 1;
            }
        }
        Ok(())
    }

    /// Run one store call under the cancellation token and timeout.
    async fn store_call<T, F>(
        &self,
        operation: StoreOperation,
        progress: &ReconciliationResult,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, ReconcileError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        if cancel.is_cancelled() {
            info!(%operation, "cancelled before store call");
            return Err(ReconcileError::Cancelled { partial: *progress });
        }
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ReconcileError::Store {
                operation,
                partial: *progress,
                source,
            }),
            Err(_) => Err(ReconcileError::Store {
                operation,
                partial: *progress,
                source: anyhow!("timed out after {:?}", self.config.store_timeout),
            }),
        }
    }
}
