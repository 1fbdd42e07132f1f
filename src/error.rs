//! Errors surfaced by a reconciliation pass.
//!
//! Per-file problems (unreadable content, binary files, parse failures)
//! never reach this type; they are handled inside the pass. What does reach
//! it is pass-level: the revision source could not describe the target, a
//! store call failed, or the caller cancelled. Store failures and
//! cancellation carry the counters the store acknowledged before the pass
//! stopped.

use std::fmt;

use repo_index_core::models::ReconciliationResult;
use thiserror::Error;

/// Which store call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Exists,
    FetchFingerprints,
    Delete,
    Insert,
    Drop,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::Exists => "collection existence check",
            StoreOperation::FetchFingerprints => "fingerprint fetch",
            StoreOperation::Delete => "delete",
            StoreOperation::Insert => "insert",
            StoreOperation::Drop => "drop collection",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("revision source failed: {0:#}")]
    Source(#[source] anyhow::Error),

    #[error("store {operation} failed after {partial}: {source:#}")]
    Store {
        operation: StoreOperation,
        partial: ReconciliationResult,
        #[source]
        source: anyhow::Error,
    },

    #[error("cancelled after {partial}")]
    Cancelled { partial: ReconciliationResult },
}

impl ReconcileError {
    /// Counters confirmed before the pass stopped.
    pub fn partial(&self) -> ReconciliationResult {
        match self {
            ReconcileError::Source(_) => ReconciliationResult::default(),
            ReconcileError::Store { partial, .. } | ReconcileError::Cancelled { partial } => {
                *partial
            }
        }
    }
}
