//! Database initialization
//!
//! Creates the database file on first run and the collection tables on every
//! run (idempotent). Degrades gracefully: an existing database is opened
//! as-is, missing tables are added.

use crate::db::collections::{CollectionSpec, COLLECTIONS};
use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize the database connection and create collection tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers while the sync loop writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Set busy timeout
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all collection tables (idempotent, safe to call multiple times)
///
/// Split out of [`init_database`] so tests can run against `sqlite::memory:`.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for spec in COLLECTIONS {
        create_collection_table(pool, spec).await?;
    }
    Ok(())
}

async fn create_collection_table(pool: &SqlitePool, spec: &CollectionSpec) -> Result<()> {
    // Uniform schema for every collection: TEXT key, JSON document, and an
    // optional integer sort column fed from the collection's index field.
    let create = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            key TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            sort_key INTEGER,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        spec.name
    );
    sqlx::query(&create).execute(pool).await?;

    if spec.index_field.is_some() {
        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_sort ON {}(sort_key)",
            spec.name, spec.name
        );
        sqlx::query(&index).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collections;

    async fn memory_pool() -> SqlitePool {
        // A single connection, otherwise every pooled connection would get
        // its own private :memory: database.
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_creates_all_collection_tables() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(count as usize, collections::COLLECTIONS.len());
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        sqlx::query("INSERT INTO settings (key, doc) VALUES ('k', '{}')")
            .execute(&pool)
            .await
            .unwrap();

        // Re-running schema creation must not drop existing data
        init_schema(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
