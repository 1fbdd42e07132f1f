//! Git revision source.
//!
//! Reads revisions straight out of a repository's object database with the
//! `git` binary, so no checkout is needed and bare clones work. Revisions are
//! anything `git rev-parse` accepts (commit SHAs, branches, tags).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use repo_index_core::models::FileEntry;
use repo_index_core::source::RevisionSource;

pub struct GitRevisionSource {
    git_dir: PathBuf,
}

impl GitRevisionSource {
    /// Open a repository given either its working directory or its git
    /// directory (for bare clones).
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Repository path does not exist: {}", path.display());
        }
        let dot_git = path.join(".git");
        let git_dir = if dot_git.is_dir() { dot_git } else { path.to_path_buf() };
        Ok(Self { git_dir })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Resolve `revision` to a full commit SHA.
    pub async fn resolve(&self, revision: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", revision);
        let output = self.git(&["rev-parse", "--verify", &spec]).await?;
        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args[0]))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args[0], stderr.trim());
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl RevisionSource for GitRevisionSource {
    async fn list_files(&self, revision: &str) -> Result<Vec<FileEntry>> {
        let stdout = self.git(&["ls-tree", "-r", "-l", "-z", revision]).await?;
        Ok(parse_ls_tree(&stdout))
    }

    async fn read_content(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let object = format!("{}:{}", revision, path);
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .args(["show", &object])
            .output()
            .await
            .with_context(|| "Failed to execute 'git show'")?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }

    async fn changed_paths(&self, from: &str, to: &str) -> Result<BTreeSet<String>> {
        let range = format!("{}..{}", from, to);
        // Without rename detection a rename shows up as delete + add.
        let stdout = self
            .git(&["diff", "--name-only", "--no-renames", "-z", &range])
            .await?;
        Ok(split_nul(&stdout).map(str::to_string).collect())
    }
}

/// `git remote get-url origin` for the repository at `dir`, if it has one.
pub async fn remote_url(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!url.is_empty()).then_some(url)
}

fn split_nul(bytes: &[u8]) -> impl Iterator<Item = &str> {
    bytes
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .filter_map(|s| std::str::from_utf8(s).ok())
}

/// Parse `git ls-tree -r -l -z` output, keeping blobs only.
///
/// Each record is `<mode> <type> <object> <size>\t<path>`. Malformed
/// records and non-blob entries (submodule commits) are skipped.
fn parse_ls_tree(stdout: &[u8]) -> Vec<FileEntry> {
    split_nul(stdout)
        .filter_map(|record| {
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let _mode = fields.next()?;
            if fields.next()? != "blob" {
                return None;
            }
            let _object = fields.next()?;
            let size = fields.next()?.parse::<u64>().ok()?;
            Some(FileEntry {
                path: path.to_string(),
                size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_tree() {
        let out = b"100644 blob 8ab686eafeb1f44702738c8b0f24f2567c36da6d      12\tsrc/main.rs\0\
160000 commit 3b18e512dba79e4c8300dd08aeb37f8e728b8dad       -\tvendor/lib\0\
100644 blob e69de29bb2d1d6434b8b29ae775ad8c2e48c5391       0\tdocs/a b.md\0\
garbage\0";
        let entries = parse_ls_tree(out);
        assert_eq!(
            entries,
            vec![
                FileEntry {
                    path: "src/main.rs".to_string(),
                    size: 12
                },
                FileEntry {
                    path: "docs/a b.md".to_string(),
                    size: 0
                },
            ]
        );
    }

    #[test]
    fn test_split_nul_drops_empty() {
        let parts: Vec<&str> = split_nul(b"a.py\0b/c.txt\0").collect();
        assert_eq!(parts, vec!["a.py", "b/c.txt"]);
    }

    #[test]
    fn test_open_missing_path() {
        assert!(GitRevisionSource::open(Path::new("/definitely/not/here")).is_err());
    }
}
