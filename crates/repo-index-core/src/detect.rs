//! Change detection.
//!
//! [`classify`] is the set-based primitive: it partitions the union of the
//! current and indexed paths into added / modified / deleted / unchanged.
//! [`detect_full`] and [`detect_differential`] layer the two
//! synchronization modes on top of it.
//!
//! Differential mode only looks at paths the revision source reported as
//! touched. A path that changed without being reported (for instance a
//! rename the source missed) stays stale until the next full pass.

use std::collections::{BTreeSet, HashMap};

use crate::models::{ChangeSet, FileRecord, IndexedFileState};

/// Classify every path in `current ∪ indexed`.
pub fn classify<'a, C, I>(current: C, indexed: I) -> ChangeSet
where
    C: IntoIterator<Item = &'a FileRecord>,
    I: IntoIterator<Item = &'a IndexedFileState>,
{
    let mut remaining: HashMap<&str, &str> = indexed
        .into_iter()
        .map(|s| (s.path.as_str(), s.fingerprint.as_str()))
        .collect();

    let mut changes = ChangeSet::default();
    for record in current {
        match remaining.remove(record.path.as_str()) {
            None => {
                changes.added.insert(record.path.clone());
            }
            Some(stored) if stored == record.fingerprint => {
                changes.unchanged.insert(record.path.clone());
            }
            Some(_) => {
                changes.modified.insert(record.path.clone());
            }
        }
    }
    changes
        .deleted
        .extend(remaining.into_keys().map(str::to_string));
    changes
}

/// Full mode: compare the whole current set against every stored path.
///
/// Paths in `skipped` (listed but unreadable this pass) are left alone:
/// they are neither re-indexed nor deleted.
pub fn detect_full(
    current: &[FileRecord],
    indexed: &[IndexedFileState],
    skipped: &BTreeSet<String>,
) -> ChangeSet {
    classify(
        current,
        indexed.iter().filter(|s| !skipped.contains(&s.path)),
    )
}

/// Differential mode: only paths in `touched` are considered.
///
/// `current` must already be restricted to touched, eligible, readable
/// paths. Touched paths missing from `eligible` are forced into `deleted`
/// whether or not the store knows them; deleting an unknown path is a
/// no-op for the store.
pub fn detect_differential(
    current: &[FileRecord],
    indexed: &[IndexedFileState],
    touched: &BTreeSet<String>,
    eligible: &BTreeSet<String>,
    skipped: &BTreeSet<String>,
) -> ChangeSet {
    let mut changes = classify(
        current,
        indexed
            .iter()
            .filter(|s| touched.contains(&s.path) && !skipped.contains(&s.path)),
    );
    for path in touched.difference(eligible) {
        changes.deleted.insert(path.clone());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(path: &str, fp: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            size: 1,
            fingerprint: fp.to_string(),
        }
    }

    fn state(path: &str, fp: &str) -> IndexedFileState {
        IndexedFileState {
            path: path.to_string(),
            fingerprint: fp.to_string(),
        }
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_classify_all_four_classes() {
        let current = vec![rec("a", "1"), rec("b", "2"), rec("c", "3")];
        let indexed = vec![state("b", "2"), state("c", "old"), state("d", "4")];
        let cs = classify(&current, &indexed);
        assert_eq!(cs.added, set(&["a"]));
        assert_eq!(cs.unchanged, set(&["b"]));
        assert_eq!(cs.modified, set(&["c"]));
        assert_eq!(cs.deleted, set(&["d"]));
    }

    #[test]
    fn test_classify_is_a_partition() {
        let current = vec![rec("a", "1"), rec("b", "2"), rec("x", "9")];
        let indexed = vec![state("b", "3"), state("y", "4"), state("x", "9")];
        let cs = classify(&current, &indexed);

        let mut seen = BTreeSet::new();
        for class in [&cs.added, &cs.modified, &cs.deleted, &cs.unchanged] {
            for p in class {
                assert!(seen.insert(p.clone()), "{p} classified twice");
            }
        }
        assert_eq!(seen, set(&["a", "b", "x", "y"]));

        let current_paths: BTreeSet<String> =
            cs.added.iter().chain(&cs.modified).chain(&cs.unchanged).cloned().collect();
        assert_eq!(current_paths, set(&["a", "b", "x"]));
    }

    #[test]
    fn test_classify_empty_index_is_all_added() {
        let current = vec![rec("a", "1"), rec("b", "2")];
        let cs = classify(&current, &Vec::<IndexedFileState>::new());
        assert_eq!(cs.added, set(&["a", "b"]));
        assert!(cs.deleted.is_empty());
    }

    #[test]
    fn test_full_mode_spares_skipped_paths() {
        let current = vec![rec("a", "1")];
        let indexed = vec![state("a", "1"), state("unreadable", "5"), state("gone", "6")];
        let cs = detect_full(&current, &indexed, &set(&["unreadable"]));
        assert_eq!(cs.deleted, set(&["gone"]));
        assert_eq!(cs.unchanged, set(&["a"]));
    }

    #[test]
    fn test_differential_ignores_untouched_index_entries() {
        let current = vec![rec("a.py", "H2")];
        let indexed = vec![state("a.py", "H1"), state("other.py", "X")];
        let cs = detect_differential(
            &current,
            &indexed,
            &set(&["a.py"]),
            &set(&["a.py", "other.py"]),
            &BTreeSet::new(),
        );
        assert_eq!(cs.modified, set(&["a.py"]));
        assert!(cs.deleted.is_empty());
        assert!(cs.added.is_empty());
    }

    #[test]
    fn test_differential_forces_delete_for_removed_paths() {
        let indexed = vec![state("keep.rs", "K")];
        let cs = detect_differential(
            &[],
            &indexed,
            &set(&["b.txt"]),
            &set(&["keep.rs"]),
            &BTreeSet::new(),
        );
        assert_eq!(cs.deleted, set(&["b.txt"]));
        assert!(cs.unchanged.is_empty());
    }

    #[test]
    fn test_differential_touched_but_same_content_is_unchanged() {
        let current = vec![rec("a.py", "H1")];
        let indexed = vec![state("a.py", "H1")];
        let cs = detect_differential(
            &current,
            &indexed,
            &set(&["a.py"]),
            &set(&["a.py"]),
            &BTreeSet::new(),
        );
        assert!(cs.is_noop());
        assert_eq!(cs.unchanged, set(&["a.py"]));
    }
}
