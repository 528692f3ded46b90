//! Storage trait for product records.
//!
//! Backends are plain key/value stores. Key normalization, per-key write
//! serialization and timestamp monotonicity live in
//! [`ResultStore`](crate::stores::ResultStore), not here.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::product::CompetitorProduct;

/// Key/value storage for validated product records.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Get the record stored under `key`.
    async fn get_product(&self, key: &str) -> StoreResult<Option<CompetitorProduct>>;

    /// Insert or replace the record under `key`.
    async fn put_product(&self, key: &str, product: &CompetitorProduct) -> StoreResult<()>;

    /// Remove the record under `key`. Missing keys are not an error.
    async fn delete_product(&self, key: &str) -> StoreResult<()>;

    /// All stored records, most recently updated first.
    async fn list_products(&self) -> StoreResult<Vec<CompetitorProduct>>;

    /// Release connections. The default does nothing.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
