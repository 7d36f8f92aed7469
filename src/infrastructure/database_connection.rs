// Database connection and pool management
// Local sync state lives in one SQLite file so it survives restarts

use std::path::Path;

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

const TABLES: &[&str] = &["cached_products", "dedup_entries", "queue_journal", "sync_meta"];

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // sqlx refuses to open a missing file without create_if_missing
        if !Path::new(db_path).exists() {
            tokio::fs::File::create(db_path).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Open (creating if needed) and migrate the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let db = Self::new(&format!("sqlite:{}", path.display())).await?;
        db.migrate().await?;
        info!("Opened sync state database: {}", path.display());
        Ok(db)
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_cached_products_sql = r#"
            CREATE TABLE IF NOT EXISTS cached_products (
                product_id TEXT PRIMARY KEY,
                record_json TEXT NOT NULL,
                analyzed INTEGER NOT NULL DEFAULT 0,
                analysis_json TEXT,
                updated_at TEXT NOT NULL
            )
        "#;

        let create_dedup_sql = r#"
            CREATE TABLE IF NOT EXISTS dedup_entries (
                product_id TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            )
        "#;

        let create_journal_sql = r#"
            CREATE TABLE IF NOT EXISTS queue_journal (
                url TEXT PRIMARY KEY,
                enqueued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0
            )
        "#;

        let create_meta_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
        "#;

        let create_index_sql = "CREATE INDEX IF NOT EXISTS idx_cached_products_analyzed ON cached_products (analyzed)";

        sqlx::query(create_cached_products_sql).execute(&self.pool).await?;
        sqlx::query(create_dedup_sql).execute(&self.pool).await?;
        sqlx::query(create_journal_sql).execute(&self.pool).await?;
        sqlx::query(create_meta_sql).execute(&self.pool).await?;
        sqlx::query(create_index_sql).execute(&self.pool).await?;

        Ok(())
    }

    /// Empty every sync table in one transaction
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in TABLES {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("Cleared local sync state");
        Ok(())
    }
}
