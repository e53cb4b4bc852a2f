//! Metadata store: per-source records plus an append-only event log.
//!
//! One row per `(source_type, source_key)` pair in `sources`, with a
//! secondary lookup index on `(source_type, content_hash)` for cross-path
//! dedup. Every mutating call commits before returning; ingestion
//! throughput is bounded by the normalization call, so durability wins.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

use crate::db;
use crate::models::SourceRecord;

pub struct MetadataStore {
    pool: SqlitePool,
    log_events: bool,
}

impl MetadataStore {
    /// Open the store, creating the database and schema if missing.
    /// Schema creation is idempotent; opening an existing store is cheap.
    pub async fn open(db_path: &Path, log_events: bool) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool, log_events })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn get(&self, source_type: &str, source_key: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(
            "SELECT source_type, source_key, content_hash, raw_path, extracted_path, note_path,
                    last_processed_at, metadata_json
             FROM sources WHERE source_type = ? AND source_key = ?",
        )
        .bind(source_type)
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Cross-path dedup lookup: any record of this type carrying this
    /// content hash.
    pub async fn get_by_hash(
        &self,
        source_type: &str,
        content_hash: &str,
    ) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(
            "SELECT source_type, source_key, content_hash, raw_path, extracted_path, note_path,
                    last_processed_at, metadata_json
             FROM sources WHERE source_type = ? AND content_hash = ?",
        )
        .bind(source_type)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Insert or fully replace the record for `(source_type, source_key)`.
    /// `last_processed_at` is stamped here, not taken from the caller.
    pub async fn upsert(&self, record: &SourceRecord) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let metadata_json = serde_json::to_string(&record.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO sources (
                source_type, source_key, content_hash, raw_path, extracted_path,
                note_path, last_processed_at, metadata_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_type, source_key) DO UPDATE SET
                content_hash = excluded.content_hash,
                raw_path = excluded.raw_path,
                extracted_path = excluded.extracted_path,
                note_path = excluded.note_path,
                last_processed_at = excluded.last_processed_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&record.source_type)
        .bind(&record.source_key)
        .bind(&record.content_hash)
        .bind(&record.raw_path)
        .bind(&record.extracted_path)
        .bind(&record.note_path)
        .bind(&now)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list(&self, source_type: Option<&str>) -> Result<Vec<SourceRecord>> {
        let rows = match source_type {
            Some(st) => {
                sqlx::query(
                    "SELECT source_type, source_key, content_hash, raw_path, extracted_path,
                            note_path, last_processed_at, metadata_json
                     FROM sources WHERE source_type = ? ORDER BY source_key",
                )
                .bind(st)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT source_type, source_key, content_hash, raw_path, extracted_path,
                            note_path, last_processed_at, metadata_json
                     FROM sources ORDER BY source_type, source_key",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(record_from_row).collect()
    }

    pub async fn count(&self, source_type: Option<&str>) -> Result<i64> {
        let count: i64 = match source_type {
            Some(st) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE source_type = ?")
                    .bind(st)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM sources")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Append an audit event. No-op when event logging is disabled.
    pub async fn log_event(
        &self,
        event_type: &str,
        details: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !self.log_events {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let details_json = serde_json::to_string(details)?;
        sqlx::query("INSERT INTO events (event_time, event_type, details_json) VALUES (?, ?, ?)")
            .bind(&now)
            .bind(event_type)
            .bind(&details_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count logged events of one type. Used by tests and diagnostics.
    pub async fn count_events(&self, event_type: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE event_type = ?")
            .bind(event_type)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL,
            source_key TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            raw_path TEXT,
            extracted_path TEXT,
            note_path TEXT,
            last_processed_at TEXT,
            metadata_json TEXT,
            UNIQUE(source_type, source_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sources_hash ON sources (source_type, content_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_time TEXT NOT NULL,
            event_type TEXT NOT NULL,
            details_json TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<SourceRecord> {
    let metadata_json: Option<String> = row.try_get("metadata_json")?;
    let metadata = metadata_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?
        .unwrap_or_default();

    Ok(SourceRecord {
        source_type: row.try_get("source_type")?,
        source_key: row.try_get("source_key")?,
        content_hash: row.try_get("content_hash")?,
        raw_path: row.try_get("raw_path")?,
        extracted_path: row.try_get("extracted_path")?,
        note_path: row.try_get("note_path")?,
        last_processed_at: row.try_get("last_processed_at")?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SOURCE_TYPE_FILE;
    use tempfile::TempDir;

    fn record(key: &str, hash: &str) -> SourceRecord {
        SourceRecord {
            source_type: SOURCE_TYPE_FILE.to_string(),
            source_key: key.to_string(),
            content_hash: hash.to_string(),
            raw_path: Some(format!("/lake/raw/file/{hash}.txt")),
            extracted_path: Some(format!("/lake/extracted/file/{hash}.txt")),
            note_path: Some(format!("/vault/sources/file/note_{hash}.md")),
            last_processed_at: None,
            metadata: BTreeMap::new(),
        }
    }

    async fn open_store(tmp: &TempDir) -> MetadataStore {
        MetadataStore::open(&tmp.path().join("meta.db"), true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.upsert(&record("/docs/a.txt", "abc123")).await.unwrap();
        let got = store
            .get(SOURCE_TYPE_FILE, "/docs/a.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.content_hash, "abc123");
        assert!(got.last_processed_at.is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_all_fields() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.upsert(&record("/docs/a.txt", "abc123")).await.unwrap();
        let mut updated = record("/docs/a.txt", "def456");
        updated.note_path = None;
        store.upsert(&updated).await.unwrap();

        let got = store
            .get(SOURCE_TYPE_FILE, "/docs/a.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.content_hash, "def456");
        assert_eq!(got.note_path, None);
        assert_eq!(store.count(Some(SOURCE_TYPE_FILE)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_by_hash_finds_other_key() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.upsert(&record("/docs/a.txt", "abc123")).await.unwrap();
        let got = store
            .get_by_hash(SOURCE_TYPE_FILE, "abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.source_key, "/docs/a.txt");
        assert!(store
            .get_by_hash(SOURCE_TYPE_FILE, "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn count_and_list_filter_by_type() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.upsert(&record("/docs/a.txt", "h1")).await.unwrap();
        store.upsert(&record("/docs/b.txt", "h2")).await.unwrap();

        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.count(Some("other")).await.unwrap(), 0);
        assert_eq!(store.list(Some(SOURCE_TYPE_FILE)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn disabled_event_log_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = MetadataStore::open(&tmp.path().join("meta.db"), false)
            .await
            .unwrap();

        store
            .log_event("file_processed", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(store.count_events("file_processed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn schema_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("meta.db");
        {
            let store = MetadataStore::open(&db_path, true).await.unwrap();
            store.upsert(&record("/docs/a.txt", "h1")).await.unwrap();
            store.close().await;
        }
        let store = MetadataStore::open(&db_path, true).await.unwrap();
        assert_eq!(store.count(Some(SOURCE_TYPE_FILE)).await.unwrap(), 1);
    }
}
