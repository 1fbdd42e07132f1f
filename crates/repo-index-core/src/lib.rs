//! # repo-index core
//!
//! Pure logic for keeping a semantic index of a source tree in step with
//! the tree's revisions: data models, path eligibility, content
//! fingerprints, chunking, change detection, and the traits the
//! reconciliation pipeline talks to.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Concrete
//! revision sources and stores live in the `repo-index` application crate;
//! in-memory implementations of both traits live here for tests.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `FileRecord`, `IndexedFileState`, `Chunk`, `ChangeSet`, `ReconciliationResult` |
//! | [`eligibility`] | Which paths at a revision are indexable |
//! | [`fingerprint`] | SHA-256 content fingerprints and strict UTF-8 decoding |
//! | [`chunk`] | Structural (tree-sitter) and generic text chunking |
//! | [`detect`] | Added / modified / deleted / unchanged classification |
//! | [`source`] | Revision source trait |
//! | [`store`] | Index store trait |

pub mod chunk;
pub mod detect;
pub mod eligibility;
pub mod fingerprint;
pub mod models;
pub mod source;
pub mod store;
