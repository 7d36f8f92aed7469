//! Persisted orchestrator state: dedup entries, queue journal and the
//! last outbound request timestamp

use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::sync_error::SyncResult;

const LAST_REQUEST_KEY: &str = "last_request_at";

/// Queue journal row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub url: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

impl SyncStateRepository {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { pool: db.pool().clone() }
    }

    // ---- dedup ----

    pub async fn record_dedup(&self, product_id: &str, expires_at: DateTime<Utc>) -> SyncResult<()> {
        sqlx::query("INSERT OR REPLACE INTO dedup_entries (product_id, expires_at) VALUES (?, ?)")
            .bind(product_id)
            .bind(expires_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_dedup(&self, product_id: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM dedup_entries WHERE product_id = ?")
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete expired entries, returning how many went
    pub async fn prune_dedup(&self, now: DateTime<Utc>) -> SyncResult<u64> {
        let result = sqlx::query("DELETE FROM dedup_entries WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Live entries; expired ones are deleted on the way
    pub async fn load_dedup(&self, now: DateTime<Utc>) -> SyncResult<Vec<(String, DateTime<Utc>)>> {
        self.prune_dedup(now).await?;

        let rows = sqlx::query("SELECT product_id, expires_at FROM dedup_entries ORDER BY expires_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> SyncResult<(String, DateTime<Utc>)> {
                Ok((row.try_get("product_id")?, from_millis(row.try_get("expires_at")?)))
            })
            .collect()
    }

    // ---- queue journal ----

    pub async fn journal_enqueue(&self, url: &str, enqueued_at: DateTime<Utc>) -> SyncResult<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_journal (url, enqueued_at, attempts) VALUES (?, ?, 0)
            ON CONFLICT(url) DO UPDATE SET enqueued_at = excluded.enqueued_at, attempts = 0
            "#,
        )
        .bind(url)
        .bind(enqueued_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn journal_attempt(&self, url: &str) -> SyncResult<()> {
        sqlx::query("UPDATE queue_journal SET attempts = attempts + 1 WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn journal_remove(&self, url: &str) -> SyncResult<()> {
        sqlx::query("DELETE FROM queue_journal WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_journal(&self) -> SyncResult<Vec<JournalEntry>> {
        let rows = sqlx::query("SELECT url, enqueued_at, attempts FROM queue_journal ORDER BY enqueued_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> SyncResult<JournalEntry> {
                let attempts: i64 = row.try_get("attempts")?;
                Ok(JournalEntry {
                    url: row.try_get("url")?,
                    enqueued_at: from_millis(row.try_get("enqueued_at")?),
                    attempts: u32::try_from(attempts).unwrap_or_default(),
                })
            })
            .collect()
    }

    pub async fn clear_journal(&self) -> SyncResult<()> {
        sqlx::query("DELETE FROM queue_journal").execute(&self.pool).await?;
        Ok(())
    }

    // ---- meta ----

    pub async fn set_last_request(&self, at: DateTime<Utc>) -> SyncResult<()> {
        sqlx::query("INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)")
            .bind(LAST_REQUEST_KEY)
            .bind(at.timestamp_millis().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn last_request(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?")
            .bind(LAST_REQUEST_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.and_then(|v| v.parse::<i64>().ok()).map(from_millis))
    }
}
