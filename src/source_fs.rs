//! Working-tree revision source.
//!
//! Treats a checked-out directory as a single, always-current revision.
//! Revision identifiers are ignored, and there is no history to diff, so
//! passes over a working tree always run in full mode.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;

use repo_index_core::eligibility::EligibilityFilter;
use repo_index_core::models::FileEntry;
use repo_index_core::source::RevisionSource;

/// Revision identifier reported for working-tree passes.
pub const WORKING_TREE: &str = "WORKTREE";

pub struct WorkingTreeSource {
    root: PathBuf,
    /// Used only to prune excluded directories during the walk.
    filter: EligibilityFilter,
}

impl WorkingTreeSource {
    pub fn new(root: &Path, filter: EligibilityFilter) -> Result<Self> {
        if !root.is_dir() {
            bail!("Working tree root does not exist: {}", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
            filter,
        })
    }
}

#[async_trait]
impl RevisionSource for WorkingTreeSource {
    async fn list_files(&self, _revision: &str) -> Result<Vec<FileEntry>> {
        let root = self.root.clone();
        let filter = self.filter.clone();
        tokio::task::spawn_blocking(move || walk(&root, &filter))
            .await
            .context("directory walk panicked")
    }

    async fn read_content(&self, _revision: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.root.join(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", full.display())),
        }
    }

    async fn changed_paths(&self, _from: &str, _to: &str) -> Result<BTreeSet<String>> {
        bail!("a working tree has no history to diff")
    }
}

/// Walk `root`, skipping entries that cannot be read or stat'ed. One bad
/// entry (a file removed mid-walk, an unreadable directory) never fails the
/// listing.
fn walk(root: &Path, filter: &EligibilityFilter) -> Vec<FileEntry> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !entry.file_type().is_dir() || !filter.is_excluded(&relative(root, entry.path()))
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = ?e.path(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file without metadata");
                continue;
            }
        };
        files.push(FileEntry {
            path: relative(root, entry.path()),
            size,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

fn relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_walk_prunes_excluded_dirs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.rs", "fn main() {}");
        write(tmp.path(), "README.md", "# hi");
        write(tmp.path(), "node_modules/pkg/index.js", "x");
        write(tmp.path(), ".git/HEAD", "ref: refs/heads/main");

        let source = WorkingTreeSource::new(tmp.path(), EligibilityFilter::default()).unwrap();
        let files = source.list_files(WORKING_TREE).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
        assert_eq!(files[1].size, 12);
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "alpha");
        let source = WorkingTreeSource::new(tmp.path(), EligibilityFilter::default()).unwrap();
        assert_eq!(
            source.read_content(WORKING_TREE, "a.txt").await.unwrap(),
            Some(b"alpha".to_vec())
        );
        assert_eq!(source.read_content(WORKING_TREE, "b.txt").await.unwrap(), None);
        assert!(source.changed_paths("a", "b").await.is_err());
    }

    #[test]
    fn test_walk_error_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("removed-before-walk");
        assert!(walk(&gone, &EligibilityFilter::default()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_does_not_fail_listing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "alpha");
        std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling")).unwrap();
        let source = WorkingTreeSource::new(tmp.path(), EligibilityFilter::default()).unwrap();
        let files = source.list_files(WORKING_TREE).await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }
}
