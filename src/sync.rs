//! CLI entry points for reconciliation passes.
//!
//! `index` reconciles a checked-out working tree (always full mode) and
//! `sync` reconciles a git revision, optionally against a prior indexed
//! revision (differential mode). Both build a [`Reconciler`] over the
//! SQLite store, run one pass, and print a one-line summary. Ctrl-C stops
//! the pass before its next store call.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use repo_index_core::models::ReconciliationResult;
use repo_index_core::store::IndexStore;

use crate::config::Config;
use crate::reconcile::{ReconcileRequest, Reconciler, ReconcilerConfig};
use crate::source_fs::{WorkingTreeSource, WORKING_TREE};
use crate::source_git::{self, GitRevisionSource};
use crate::sqlite_store::SqliteIndexStore;

/// Machine-readable pass report printed with `--json`.
#[derive(Debug, Serialize)]
struct PassReport<'a> {
    collection: &'a str,
    target_revision: &'a str,
    prior_revision: Option<&'a str>,
    #[serde(flatten)]
    result: ReconciliationResult,
}

/// Reconcile a working tree into `collection`.
///
/// Without an explicit collection the name is derived from the origin
/// remote URL, or the directory name when there is no remote.
pub async fn run_index(
    config: &Config,
    path: &Path,
    collection: Option<String>,
    recreate: bool,
    json: bool,
) -> Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    let collection = match collection {
        Some(name) => sanitize_collection_name(&name),
        None => default_collection_name(&root).await,
    };
    if collection.is_empty() {
        anyhow::bail!("Could not derive a collection name for {}; pass --collection", root.display());
    }

    let store = Arc::new(SqliteIndexStore::open(config).await?);
    let reconciler_config = ReconcilerConfig::from_config(config)?;
    let source = Arc::new(WorkingTreeSource::new(
        &root,
        reconciler_config.eligibility.clone(),
    )?);
    let reconciler = Reconciler::new(store.clone(), source, reconciler_config);
    let cancel = cancel_on_ctrl_c();

    if recreate {
        if let Err(e) = reconciler.drop_collection(&collection, &cancel).await {
            store.close().await;
            return Err(e.into());
        }
    }
    println!("Indexing {} into collection {}", root.display(), collection);

    let request = ReconcileRequest::new(collection, WORKING_TREE);
    let outcome = run_pass(&reconciler, &request, &cancel, json).await;
    store.close().await;
    outcome
}

/// Reconcile a git revision into `collection`.
pub async fn run_sync(
    config: &Config,
    repo: &Path,
    collection: &str,
    target: &str,
    prior: Option<&str>,
    json: bool,
) -> Result<()> {
    let source = Arc::new(GitRevisionSource::open(repo)?);
    let target = source.resolve(target).await?;
    let prior = match prior {
        Some(rev) => Some(source.resolve(rev).await?),
        None => None,
    };

    let store = Arc::new(SqliteIndexStore::open(config).await?);
    let reconciler_config = ReconcilerConfig::from_config(config)?;

    let mut request = ReconcileRequest::new(sanitize_collection_name(collection), target);
    if let Some(prior) = prior {
        request = request.with_prior(prior);
    }
    let reconciler = Reconciler::new(store.clone(), source, reconciler_config);
    let outcome = run_pass(&reconciler, &request, &cancel_on_ctrl_c(), json).await;
    store.close().await;
    outcome
}

/// Print whether `collection` exists and how much it holds.
///
/// The name is sanitized the same way `index` and `sync` sanitize it.
pub async fn run_status(config: &Config, collection: &str) -> Result<()> {
    let collection = sanitize_collection_name(collection);
    let collection = collection.as_str();
    let store = SqliteIndexStore::open(config).await?;
    if !store.collection_exists(collection).await? {
        println!("Collection {} does not exist.", collection);
        store.close().await;
        return Ok(());
    }

    let page_size = config.indexing.fetch_page_size;
    let mut files = 0usize;
    let mut token = None;
    loop {
        let page = store
            .fetch_fingerprints(collection, token.as_ref(), page_size)
            .await?;
        files += page.entries.len();
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    let chunks = store.chunk_count(collection).await?;
    println!("Collection {}: {} files, {} chunks.", collection, files, chunks);
    store.close().await;
    Ok(())
}

async fn run_pass(
    reconciler: &Reconciler,
    request: &ReconcileRequest,
    cancel: &CancellationToken,
    json: bool,
) -> Result<()> {
    match reconciler.reconcile(request, cancel).await {
        Ok(result) => {
            if json {
                let report = PassReport {
                    collection: &request.collection,
                    target_revision: &request.target_revision,
                    prior_revision: request.prior_revision.as_deref(),
                    result,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Done. {}", summary(&result));
            }
            Ok(())
        }
        Err(e) => {
            println!("Stopped. {}", summary(&e.partial()));
            Err(e.into())
        }
    }
}

fn summary(result: &ReconciliationResult) -> String {
    format!(
        "Indexed {} files, {} chunks upserted, {} files removed.",
        result.files_indexed, result.chunks_upserted, result.files_removed
    )
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; stopping before the next store call");
            token.cancel();
        }
    });
    cancel
}

async fn default_collection_name(root: &Path) -> String {
    match source_git::remote_url(root).await {
        Some(url) => sanitize_collection_name(&url),
        None => {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            sanitize_collection_name(&name)
        }
    }
}

/// Replace every character outside `[A-Za-z0-9]` with `_` and strip
/// leading and trailing underscores.
pub fn sanitize_collection_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    replaced.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_remote_url() {
        assert_eq!(
            sanitize_collection_name("git@github.com:acme/widgets.git"),
            "git_github_com_acme_widgets_git"
        );
        assert_eq!(
            sanitize_collection_name("https://github.com/acme/widgets/"),
            "https___github_com_acme_widgets"
        );
    }

    #[test]
    fn test_sanitize_non_ascii_and_edges() {
        assert_eq!(sanitize_collection_name("__café__"), "caf");
        assert_eq!(sanitize_collection_name("___"), "");
        assert_eq!(sanitize_collection_name("plain123"), "plain123");
    }

    #[test]
    fn test_summary_line() {
        let result = ReconciliationResult {
            files_indexed: 3,
            chunks_upserted: 7,
            files_removed: 1,
        };
        assert_eq!(
            summary(&result),
            "Indexed 3 files, 7 chunks upserted, 1 files removed."
        );
    }
}
