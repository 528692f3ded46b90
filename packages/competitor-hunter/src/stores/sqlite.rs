//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local development
//! - Single-machine analysis runs
//! - Testing with persistent data

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::ProductStore;
use crate::types::product::CompetitorProduct;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

/// SQLite-based product store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://data/competitors.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open (creating if needed) the database file at `path`.
    ///
    /// The parent directory is created when missing.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(Box::new(e)))?;
        }
        Self::new(&format!("sqlite://{}?mode=rwc", path.display())).await
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        // A single connection, otherwise each connection gets its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competitor_products (
                url_key TEXT PRIMARY KEY,
                product_name TEXT NOT NULL,
                payload TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_products_last_updated
                ON competitor_products(last_updated);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    url_key: String,
    payload: String,
}

impl ProductRow {
    fn into_product(self) -> StoreResult<CompetitorProduct> {
        CompetitorProduct::from_json(&self.payload).map_err(|e| StoreError::Corrupt {
            key: self.url_key,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ProductStore for SqliteStore {
    async fn get_product(&self, key: &str) -> StoreResult<Option<CompetitorProduct>> {
        let row: Option<ProductRow> =
            sqlx::query_as("SELECT url_key, payload FROM competitor_products WHERE url_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(ProductRow::into_product).transpose()
    }

    async fn put_product(&self, key: &str, product: &CompetitorProduct) -> StoreResult<()> {
        let payload = product.to_json_pretty().map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO competitor_products (url_key, product_name, payload, last_updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url_key) DO UPDATE SET
                product_name = excluded.product_name,
                payload = excluded.payload,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(key)
        .bind(&product.product_name)
        .bind(payload)
        .bind(product.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn delete_product(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM competitor_products WHERE url_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_products(&self) -> StoreResult<Vec<CompetitorProduct>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT url_key, payload FROM competitor_products ORDER BY last_updated DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(ProductRow::into_product).collect()
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
