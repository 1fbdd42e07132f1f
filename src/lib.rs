//! # repo-index
//!
//! Keeps a semantic index of a source tree in sync with the tree's
//! revisions, re-chunking only the files that changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Revision src │──▶│  Reconciler  │──▶│  SQLite   │
//! │ git / tree   │   │ detect+chunk │   │  chunks   │
//! └──────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! The pure pieces (eligibility, fingerprints, chunking, change detection)
//! live in `repo-index-core`; this crate adds the concrete store and
//! sources, the reconciliation pass, and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! repo-index init
//! repo-index index ./my-project
//! repo-index sync --repo ./my-project --collection my_project --target HEAD --prior HEAD~3
//! repo-index status my_project
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite index store and connection |
//! | [`source_git`] | Git revision source |
//! | [`source_fs`] | Working-tree revision source |
//! | [`reconcile`] | The reconciliation pass |
//! | [`error`] | Pass-level errors |
//! | [`sync`] | CLI entry points |

pub mod config;
pub mod error;
pub mod migrate;
pub mod reconcile;
pub mod source_fs;
pub mod source_git;
pub mod sqlite_store;
pub mod sync;
