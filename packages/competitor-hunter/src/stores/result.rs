//! Keyed result storage over any [`ProductStore`] backend.
//!
//! Records are keyed by normalized URL. Writes to the same key are
//! serialized; writes to different keys proceed in parallel. The
//! `last_updated` timestamp of a key never moves backwards.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::normalize::normalize_url;
use crate::traits::store::ProductStore;
use crate::types::product::CompetitorProduct;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Upserts and lookups of validated products keyed by normalized URL.
pub struct ResultStore<S: ProductStore> {
    backend: S,
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl<S: ProductStore> ResultStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Normalized key for `url`.
    pub fn key_for(url: &str) -> StoreResult<String> {
        normalize_url(url).map_err(|e| StoreError::InvalidKey(e.to_string()))
    }

    fn lock_for(&self, key: &str) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry for `key` when no other writer holds a handle.
    fn release_lock(&self, key: &str, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Insert or replace the record for `product.url`.
    ///
    /// Last writer wins. When the existing record is newer than the
    /// incoming one, the stored timestamp is bumped past it so that
    /// `last_updated` stays monotonic per key. Returns the record as
    /// stored.
    pub async fn upsert(&self, product: CompetitorProduct) -> StoreResult<CompetitorProduct> {
        let key = Self::key_for(&product.url)?;
        let lock = self.lock_for(&key);

        let result = {
            let _guard = lock.lock().await;
            self.write_locked(&key, product).await
        };

        self.release_lock(&key, lock);
        result
    }

    async fn write_locked(
        &self,
        key: &str,
        mut product: CompetitorProduct,
    ) -> StoreResult<CompetitorProduct> {
        let previous = match self.backend.get_product(key).await {
            Ok(previous) => previous,
            Err(StoreError::Corrupt { reason, .. }) => {
                warn!(key, reason = %reason, "Replacing unreadable record");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(previous) = previous {
            if previous.last_updated >= product.last_updated {
                product.last_updated = previous.last_updated + ChronoDuration::microseconds(1);
            }
        }

        product.url = key.to_string();
        self.backend.put_product(key, &product).await?;
        debug!(key, product = %product.product_name, "Stored product");
        Ok(product)
    }

    /// The record stored for `url`.
    pub async fn get(&self, url: &str) -> StoreResult<CompetitorProduct> {
        let key = Self::key_for(url)?;
        self.backend
            .get_product(&key)
            .await?
            .ok_or(StoreError::NotFound { key })
    }

    /// The record stored for `url`, or `None`.
    pub async fn find(&self, url: &str) -> StoreResult<Option<CompetitorProduct>> {
        let key = Self::key_for(url)?;
        self.backend.get_product(&key).await
    }

    /// When the record for `url` was last written.
    pub async fn last_updated(&self, url: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.find(url).await?.map(|p| p.last_updated))
    }

    /// Whether a record for `url` exists and was written within `window`.
    pub async fn is_fresh(&self, url: &str, window: Duration) -> StoreResult<bool> {
        Ok(self.fresh(url, window).await?.is_some())
    }

    /// The fresh record for `url`, if any.
    pub async fn fresh(&self, url: &str, window: Duration) -> StoreResult<Option<CompetitorProduct>> {
        let Some(product) = self.find(url).await? else {
            return Ok(None);
        };
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX);
        if Utc::now().signed_duration_since(product.last_updated) <= window {
            Ok(Some(product))
        } else {
            Ok(None)
        }
    }

    /// All records, most recently updated first.
    pub async fn list(&self) -> StoreResult<Vec<CompetitorProduct>> {
        self.backend.list_products().await
    }

    /// Remove the record for `url`.
    pub async fn delete(&self, url: &str) -> StoreResult<()> {
        let key = Self::key_for(url)?;
        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            self.backend.delete_product(&key).await
        };
        self.release_lock(&key, lock);
        result
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.backend.close().await
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
