//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/index.sqlite"
//!
//! [indexing]
//! max_file_bytes = 512000
//! exclude_dirs = [".git", "node_modules", "__pycache__", ".venv", "dist", "build"]
//! exclude_globs = ["**/*.lock"]
//! insert_batch_size = 20
//! fetch_page_size = 250
//! read_concurrency = 8
//! store_timeout_secs = 30
//!
//! [chunking]
//! code_chunk_lines = 40
//! code_overlap_lines = 5
//! code_max_chars = 1500
//! text_chunk_chars = 512
//! text_overlap_chars = 64
//! ```
//!
//! Every section except `[db]` is optional.

use anyhow::{Context, Result};
use repo_index_core::chunk::{ChunkerConfig, CodeLimits, TextLimits};
use repo_index_core::eligibility::{EligibilityFilter, DEFAULT_EXCLUDED_DIRS, MAX_FILE_BYTES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    #[serde(default = "default_fetch_page_size")]
    pub fetch_page_size: usize,
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            exclude_dirs: default_exclude_dirs(),
            exclude_globs: Vec::new(),
            insert_batch_size: default_insert_batch_size(),
            fetch_page_size: default_fetch_page_size(),
            read_concurrency: default_read_concurrency(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    MAX_FILE_BYTES
}
fn default_exclude_dirs() -> Vec<String> {
    DEFAULT_EXCLUDED_DIRS.iter().map(|d| d.to_string()).collect()
}
fn default_insert_batch_size() -> usize {
    20
}
fn default_fetch_page_size() -> usize {
    250
}
fn default_read_concurrency() -> usize {
    8
}
fn default_store_timeout_secs() -> u64 {
    30
}

impl IndexingConfig {
    pub fn eligibility_filter(&self) -> Result<EligibilityFilter> {
        EligibilityFilter::new(
            self.max_file_bytes,
            self.exclude_dirs.iter().cloned(),
            &self.exclude_globs,
        )
        .with_context(|| "Invalid indexing.exclude_globs pattern")
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_code_chunk_lines")]
    pub code_chunk_lines: usize,
    #[serde(default = "default_code_overlap_lines")]
    pub code_overlap_lines: usize,
    #[serde(default = "default_code_max_chars")]
    pub code_max_chars: usize,
    #[serde(default = "default_text_chunk_chars")]
    pub text_chunk_chars: usize,
    #[serde(default = "default_text_overlap_chars")]
    pub text_overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            code_chunk_lines: default_code_chunk_lines(),
            code_overlap_lines: default_code_overlap_lines(),
            code_max_chars: default_code_max_chars(),
            text_chunk_chars: default_text_chunk_chars(),
            text_overlap_chars: default_text_overlap_chars(),
        }
    }
}

fn default_code_chunk_lines() -> usize {
    40
}
fn default_code_overlap_lines() -> usize {
    5
}
fn default_code_max_chars() -> usize {
    1500
}
fn default_text_chunk_chars() -> usize {
    512
}
fn default_text_overlap_chars() -> usize {
    64
}

impl ChunkingConfig {
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            code: CodeLimits {
                max_lines: self.code_chunk_lines,
                overlap_lines: self.code_overlap_lines,
                max_chars: self.code_max_chars,
            },
            text: TextLimits {
                chunk_chars: self.text_chunk_chars,
                overlap_chars: self.text_overlap_chars,
            },
        }
    }
}

impl Config {
    /// Defaults with the database under `./data`, for commands that can run
    /// without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/index.sqlite"),
            },
            indexing: IndexingConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let indexing = &config.indexing;
    if indexing.max_file_bytes == 0 {
        anyhow::bail!("indexing.max_file_bytes must be > 0");
    }
    if indexing.insert_batch_size == 0 {
        anyhow::bail!("indexing.insert_batch_size must be > 0");
    }
    if indexing.fetch_page_size == 0 {
        anyhow::bail!("indexing.fetch_page_size must be > 0");
    }
    if indexing.read_concurrency == 0 {
        anyhow::bail!("indexing.read_concurrency must be > 0");
    }
    if indexing.store_timeout_secs == 0 {
        anyhow::bail!("indexing.store_timeout_secs must be > 0");
    }
    indexing.eligibility_filter()?;

    let chunking = &config.chunking;
    if chunking.code_chunk_lines == 0 || chunking.code_max_chars == 0 {
        anyhow::bail!("chunking.code_chunk_lines and chunking.code_max_chars must be > 0");
    }
    if chunking.code_overlap_lines >= chunking.code_chunk_lines {
        anyhow::bail!("chunking.code_overlap_lines must be smaller than chunking.code_chunk_lines");
    }
    if chunking.text_chunk_chars == 0 {
        anyhow::bail!("chunking.text_chunk_chars must be > 0");
    }
    if chunking.text_overlap_chars >= chunking.text_chunk_chars {
        anyhow::bail!("chunking.text_overlap_chars must be smaller than chunking.text_chunk_chars");
    }
    Ok(())
}
