//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::ProductStore;
use crate::types::product::CompetitorProduct;

/// In-memory product storage.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<String, CompetitorProduct>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.products.write().unwrap().clear();
    }

    /// Get the number of stored products.
    pub fn product_count(&self) -> usize {
        self.products.read().unwrap().len()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_product(&self, key: &str) -> StoreResult<Option<CompetitorProduct>> {
        Ok(self.products.read().unwrap().get(key).cloned())
    }

    async fn put_product(&self, key: &str, product: &CompetitorProduct) -> StoreResult<()> {
        self.products
            .write()
            .unwrap()
            .insert(key.to_string(), product.clone());
        Ok(())
    }

    async fn delete_product(&self, key: &str) -> StoreResult<()> {
        self.products.write().unwrap().remove(key);
        Ok(())
    }

    async fn list_products(&self) -> StoreResult<Vec<CompetitorProduct>> {
        let mut products: Vec<_> = self.products.read().unwrap().values().cloned().collect();
        products.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(products)
    }
}
