//! # repo-index CLI
//!
//! ## Usage
//!
//! ```bash
//! repo-index --config ./config/repo-index.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-index init` | Create the SQLite database and schema |
//! | `repo-index index <PATH>` | Reconcile a working tree (full mode) |
//! | `repo-index sync --repo <DIR> --collection <NAME> --target <REV>` | Reconcile a git revision |
//! | `repo-index status <COLLECTION>` | Show what a collection holds |
//!
//! Logs go to stderr and are controlled with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use repo_index::config::{self, Config};
use repo_index::sqlite_store::SqliteIndexStore;
use repo_index::sync;

/// Incremental semantic indexing of source trees.
#[derive(Parser)]
#[command(
    name = "repo-index",
    about = "Keep a semantic index of a source tree in sync with its revisions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/repo-index.toml`. When the file does not
    /// exist, built-in defaults are used with the database under `./data`.
    #[arg(long, global = true, default_value = "./config/repo-index.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index a checked-out working tree.
    ///
    /// Every pass compares the whole tree against what the collection
    /// holds and only re-chunks files whose content changed.
    Index {
        /// Directory to index.
        path: PathBuf,

        /// Collection name. Defaults to the sanitized origin remote URL,
        /// or the directory name.
        #[arg(long)]
        collection: Option<String>,

        /// Drop the collection before indexing.
        #[arg(long)]
        recreate: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Index a git revision.
    ///
    /// With `--prior`, only paths changed between the two revisions are
    /// examined.
    Sync {
        /// Repository working directory or git directory.
        #[arg(long)]
        repo: PathBuf,

        #[arg(long)]
        collection: String,

        /// Revision to index.
        #[arg(long)]
        target: String,

        /// Revision last indexed into the collection.
        #[arg(long)]
        prior: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show whether a collection exists and how many files it tracks.
    Status { collection: String },
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteIndexStore::open(&cfg).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            path,
            collection,
            recreate,
            json,
        } => {
            sync::run_index(&cfg, &path, collection, recreate, json).await?;
        }
        Commands::Sync {
            repo,
            collection,
            target,
            prior,
            json,
        } => {
            sync::run_sync(&cfg, &repo, &collection, &target, prior.as_deref(), json).await?;
        }
        Commands::Status { collection } => {
            sync::run_status(&cfg, &collection).await?;
        }
    }

    Ok(())
}
