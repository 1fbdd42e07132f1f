//! Path eligibility.
//!
//! A path is indexable unless one of its segments is hidden (starts with
//! `.`) or names an excluded directory, it matches an extra exclusion glob,
//! or its size exceeds the byte ceiling. The check is pure and total.

use std::collections::HashSet;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Files larger than this are never indexed (500 KiB).
pub const MAX_FILE_BYTES: u64 = 500 * 1024;

/// Directory names skipped anywhere in a path.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "dist",
    "build",
];

/// Decides which paths at a revision are indexable.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    max_file_bytes: u64,
    excluded_dirs: HashSet<String>,
    exclude_globs: GlobSet,
}

impl EligibilityFilter {
    /// Build a filter from a size ceiling, excluded segment names, and extra
    /// glob patterns. Fails only if a glob does not compile.
    pub fn new<I, S>(max_file_bytes: u64, excluded_dirs: I, exclude_globs: &[String]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            max_file_bytes,
            excluded_dirs: excluded_dirs.into_iter().map(Into::into).collect(),
            exclude_globs: build_globset(exclude_globs)?,
        })
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// True when `path` may be indexed given its `size` in bytes.
    pub fn is_eligible(&self, path: &str, size: u64) -> bool {
        size <= self.max_file_bytes && !self.is_excluded(path)
    }

    /// Path-only part of the check, used to prune directory walks.
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = normalize_path(path);
        let hidden_or_skipped = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .any(|segment| segment.starts_with('.') || self.excluded_dirs.contains(segment));
        hidden_or_skipped || self.exclude_globs.is_match(path.as_str())
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_FILE_BYTES,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect(),
            exclude_globs: GlobSet::empty(),
        }
    }
}

/// Forward-slash form of a revision-relative path, without a leading `./`.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_source_file_is_eligible() {
        let filter = EligibilityFilter::default();
        assert!(filter.is_eligible("src/main.rs", 1024));
        assert!(filter.is_eligible("README.md", 0));
    }

    #[test]
    fn test_hidden_segments_are_excluded() {
        let filter = EligibilityFilter::default();
        assert!(!filter.is_eligible(".env", 10));
        assert!(!filter.is_eligible(".github/workflows/ci.yml", 10));
        assert!(!filter.is_eligible("src/.cache/data.txt", 10));
    }

    #[test]
    fn test_excluded_directories_anywhere_in_path() {
        let filter = EligibilityFilter::default();
        assert!(!filter.is_eligible("node_modules/react/index.js", 10));
        assert!(!filter.is_eligible("web/node_modules/react/index.js", 10));
        assert!(!filter.is_eligible("pkg/__pycache__/mod.cpython-311.pyc", 10));
        assert!(!filter.is_eligible("dist/bundle.js", 10));
        assert!(!filter.is_eligible("build/out.txt", 10));
        // Only whole segments match.
        assert!(filter.is_eligible("builder/mod.rs", 10));
    }

    #[test]
    fn test_size_ceiling_is_inclusive() {
        let filter = EligibilityFilter::default();
        assert!(filter.is_eligible("big.txt", MAX_FILE_BYTES));
        assert!(!filter.is_eligible("big.txt", MAX_FILE_BYTES + 1));
    }

    #[test]
    fn test_extra_globs() {
        let filter = EligibilityFilter::new(
            MAX_FILE_BYTES,
            DEFAULT_EXCLUDED_DIRS.iter().copied(),
            &["**/*.lock".to_string(), "vendor/**".to_string()],
        )
        .unwrap();
        assert!(!filter.is_eligible("Cargo.lock", 10));
        assert!(!filter.is_eligible("sub/yarn.lock", 10));
        assert!(!filter.is_eligible("vendor/lib/a.go", 10));
        assert!(filter.is_eligible("src/lib.rs", 10));
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let result = EligibilityFilter::new(MAX_FILE_BYTES, Vec::<String>::new(), &["a[".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("src\\win\\a.rs"), "src/win/a.rs");
        assert_eq!(normalize_path("a.py"), "a.py");
    }
}
