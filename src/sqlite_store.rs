//! SQLite-backed [`IndexStore`] implementation.
//!
//! One row per chunk in `chunks`, keyed by `(collection, file_path,
//! chunk_index)`, with the file's fingerprint in `file_hash`. A collection
//! exists once a row for it is in `collections`, which the first insert
//! creates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use repo_index_core::models::{ChunkRecord, IndexedFileState};
use repo_index_core::store::{FingerprintPage, IndexStore, PageToken};

use crate::config::Config;
use crate::migrate;

const MAX_CONNECTIONS: u32 = 4;

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database, creating the file and its parent
    /// directory when missing, and bring the schema up to date.
    pub async fn open(config: &Config) -> Result<Self> {
        let path = &config.db.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open index database {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn chunk_count(&self, collection: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn fetch_fingerprints(
        &self,
        collection: &str,
        page: Option<&PageToken>,
        limit: usize,
    ) -> Result<FingerprintPage> {
        let after = page.map(|t| t.0.as_str()).unwrap_or("");
        // One extra row tells us whether another page follows.
        let rows = sqlx::query(
            r#"
            SELECT file_path, MIN(file_hash) AS file_hash
            FROM chunks
            WHERE collection = ? AND file_path > ?
            GROUP BY file_path
            ORDER BY file_path
            LIMIT ?
            "#,
        )
        .bind(collection)
        .bind(after)
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() > limit;
        let entries: Vec<IndexedFileState> = rows
            .iter()
            .take(limit)
            .map(|row| IndexedFileState {
                path: row.get("file_path"),
                fingerprint: row.get("file_hash"),
            })
            .collect();
        let next = if has_more {
            entries.last().map(|e| PageToken(e.path.clone()))
        } else {
            None
        };
        Ok(FingerprintPage { entries, next })
    }

    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE collection = ? AND file_path = ?")
            .bind(collection)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_chunks(&self, collection: &str, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for record in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (collection, file_path, chunk_index, text, byte_length, file_hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, file_path, chunk_index) DO UPDATE SET
                    text = excluded.text,
                    byte_length = excluded.byte_length,
                    file_hash = excluded.file_hash
                "#,
            )
            .bind(collection)
            .bind(&record.chunk.source_path)
            .bind(record.chunk.ordinal as i64)
            .bind(&record.chunk.text)
            .bind(record.chunk.byte_length as i64)
            .bind(&record.file_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use repo_index_core::models::Chunk;
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteIndexStore {
        let config = Config {
            db: DbConfig {
                path: tmp.path().join("data/index.sqlite"),
            },
            ..Config::minimal()
        };
        SqliteIndexStore::open(&config).await.unwrap()
    }

    fn record(path: &str, ordinal: usize, hash: &str) -> ChunkRecord {
        let text = format!("chunk {ordinal} of {path}");
        ChunkRecord {
            chunk: Chunk {
                source_path: path.to_string(),
                ordinal,
                byte_length: text.len(),
                text,
            },
            file_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_creates_collection() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        assert!(!store.collection_exists("repo_main").await.unwrap());
        store
            .insert_chunks("repo_main", &[record("a.py", 0, "h1"), record("a.py", 1, "h1")])
            .await
            .unwrap();
        assert!(store.collection_exists("repo_main").await.unwrap());
        assert_eq!(store.chunk_count("repo_main").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_pages() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let chunks: Vec<ChunkRecord> = (0..5)
            .flat_map(|i| {
                let path = format!("src/f{i}.rs");
                vec![record(&path, 0, &format!("h{i}")), record(&path, 1, &format!("h{i}"))]
            })
            .collect();
        store.insert_chunks("c", &chunks).await.unwrap();

        let first = store.fetch_fingerprints("c", None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.entries[0].path, "src/f0.rs");
        assert_eq!(first.entries[0].fingerprint, "h0");
        let token = first.next.expect("more pages");

        let second = store.fetch_fingerprints("c", Some(&token), 2).await.unwrap();
        assert_eq!(second.entries[0].path, "src/f2.rs");
        let token = second.next.expect("more pages");

        let third = store.fetch_fingerprints("c", Some(&token), 2).await.unwrap();
        assert_eq!(third.entries.len(), 1);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_drop() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .insert_chunks("c", &[record("a.py", 0, "h"), record("b.py", 0, "g")])
            .await
            .unwrap();
        store.delete_by_path("c", "a.py").await.unwrap();
        store.delete_by_path("c", "missing.py").await.unwrap();
        assert_eq!(store.chunk_count("c").await.unwrap(), 1);

        store.drop_collection("c").await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
        assert_eq!(store.chunk_count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_state() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            store.insert_chunks("c", &[record("a.py", 0, "h")]).await.unwrap();
            store.close().await;
        }
        let store = open_store(&tmp).await;
        let page = store.fetch_fingerprints("c", None, 10).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].fingerprint, "h");
    }

    #[tokio::test]
    async fn test_open_creates_database_and_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/index.sqlite");
        let config = Config {
            db: DbConfig { path: path.clone() },
            ..Config::minimal()
        };

        let store = SqliteIndexStore::open(&config).await.unwrap();
        assert!(path.exists());
        assert!(!store.collection_exists("c").await.unwrap());
        store.close().await;

        // A second open over the same file leaves the schema in place.
        let store = SqliteIndexStore::open(&config).await.unwrap();
        assert_eq!(store.chunk_count("c").await.unwrap(), 0);
    }
}
