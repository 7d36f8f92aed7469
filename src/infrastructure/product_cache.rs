//! Local durable cache of the latest record per catalog identifier
//!
//! A newer record replaces the stored one as a whole; the analysis columns
//! belong to the cache row and survive record replacement.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::debug;

use crate::domain::events::SyncStats;
use crate::domain::product::{AnalysisRecord, CachedProduct, ProductRecord};
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::sync_error::SyncResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    /// Stored record is byte-identical; nothing was written
    Unchanged,
}

impl MergeOutcome {
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Clone)]
pub struct ProductCache {
    pool: SqlitePool,
}

impl ProductCache {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { pool: db.pool().clone() }
    }

    /// Whole-record last-write-wins
    pub async fn merge(&self, record: &ProductRecord) -> SyncResult<MergeOutcome> {
        let record_json = serde_json::to_string(record)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar("SELECT record_json FROM cached_products WHERE product_id = ?")
            .bind(&record.product_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing.as_deref() {
            Some(stored) if stored == record_json => return Ok(MergeOutcome::Unchanged),
            Some(_) => MergeOutcome::Updated,
            None => MergeOutcome::Inserted,
        };

        sqlx::query(
            r#"
            INSERT INTO cached_products (product_id, record_json, analyzed, analysis_json, updated_at)
            VALUES (?, ?, 0, NULL, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                record_json = excluded.record_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.product_id)
        .bind(&record_json)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(product_id = %record.product_id, ?outcome, "merged record into cache");
        Ok(outcome)
    }

    pub async fn get(&self, product_id: &str) -> SyncResult<Option<CachedProduct>> {
        let row = sqlx::query(
            "SELECT record_json, analyzed, analysis_json, updated_at FROM cached_products WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_cached).transpose()
    }

    /// Most recently updated first
    pub async fn list(&self) -> SyncResult<Vec<CachedProduct>> {
        let rows = sqlx::query(
            "SELECT record_json, analyzed, analysis_json, updated_at FROM cached_products ORDER BY updated_at DESC, product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_cached).collect()
    }

    /// Mark a cached product analyzed; `false` when it is not cached
    pub async fn attach_analysis(&self, analysis: &AnalysisRecord) -> SyncResult<bool> {
        let analysis_json = serde_json::to_string(analysis)?;
        let result = sqlx::query(
            "UPDATE cached_products SET analyzed = 1, analysis_json = ?, updated_at = ? WHERE product_id = ?",
        )
        .bind(&analysis_json)
        .bind(Utc::now())
        .bind(&analysis.product_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn stats(&self) -> SyncResult<SyncStats> {
        let row = sqlx::query("SELECT COUNT(*) AS total, COALESCE(SUM(analyzed), 0) AS analyzed FROM cached_products")
            .fetch_one(&self.pool)
            .await?;

        let total: i64 = row.try_get("total")?;
        let analyzed: i64 = row.try_get("analyzed")?;
        Ok(SyncStats {
            cached_products: u64::try_from(total).unwrap_or_default(),
            analyzed_products: u64::try_from(analyzed).unwrap_or_default(),
        })
    }

    pub async fn clear(&self) -> SyncResult<()> {
        sqlx::query("DELETE FROM cached_products").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_cached(row: &SqliteRow) -> SyncResult<CachedProduct> {
    let record_json: String = row.try_get("record_json")?;
    let analyzed: bool = row.try_get("analyzed")?;
    let analysis_json: Option<String> = row.try_get("analysis_json")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(CachedProduct {
        record: serde_json::from_str(&record_json)?,
        analyzed,
        analysis: analysis_json.as_deref().map(serde_json::from_str).transpose()?,
        updated_at,
    })
}
