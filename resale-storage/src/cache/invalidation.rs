//! Category-scoped invalidation.
//!
//! Every cached key belongs to one or more categories. A write to the backing
//! store invalidates the categories it affects, which deletes every key they
//! own. Registrations outlive invalidation, so a key rebuilt later is still
//! covered.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use resale_core::{
    CacheKey, CacheRead, InvalidationCategory, ResaleResult, StorageError, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::CacheStore;
use super::traits::HostCache;

/// Category registry wrapped around a [`CacheStore`].
pub struct InvalidationBus<H: HostCache + ?Sized> {
    store: Arc<CacheStore<H>>,
    registry: RwLock<HashMap<InvalidationCategory, BTreeSet<CacheKey>>>,
}

impl<H: HostCache + ?Sized> InvalidationBus<H> {
    pub fn new(store: Arc<CacheStore<H>>) -> Self {
        Self {
            store,
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore<H> {
        &self.store
    }

    /// Record that `key` belongs to `category`. Idempotent.
    ///
    /// `All` is a selector, not an owner, and is rejected.
    pub fn register(&self, category: InvalidationCategory, key: &str) -> ResaleResult<()> {
        if category == InvalidationCategory::All {
            return Err(ValidationError::InvalidValue {
                field: "category".to_string(),
                reason: "keys cannot be registered under 'all'".to_string(),
            }
            .into());
        }
        let mut registry = self.registry.write().map_err(|_| StorageError::LockPoisoned)?;
        registry.entry(category).or_default().insert(key.to_string());
        Ok(())
    }

    /// Keys currently registered under `category`, sorted and deduplicated.
    ///
    /// For `All` this is the union over every category.
    pub fn keys_for(&self, category: InvalidationCategory) -> ResaleResult<Vec<CacheKey>> {
        let registry = self.registry.read().map_err(|_| StorageError::LockPoisoned)?;
        let keys: BTreeSet<&CacheKey> = match category {
            InvalidationCategory::All => registry.values().flatten().collect(),
            other => registry.get(&other).into_iter().flatten().collect(),
        };
        Ok(keys.into_iter().cloned().collect())
    }

    /// Delete every key owned by `category` (or every key for `All`).
    ///
    /// Failures on individual keys are logged and skipped. Returns how many
    /// keys were actually invalidated.
    pub async fn invalidate(&self, category: InvalidationCategory) -> ResaleResult<usize> {
        let keys = self.keys_for(category)?;
        let invalidated = self.invalidate_keys(&keys).await;
        tracing::info!(
            category = %category,
            keys = keys.len(),
            failed = keys.len() - invalidated,
            "Invalidated cache category"
        );
        Ok(invalidated)
    }

    /// Invalidate several categories, each key at most once.
    pub async fn invalidate_many(&self, categories: &[InvalidationCategory]) -> ResaleResult<usize> {
        if categories.contains(&InvalidationCategory::All) {
            return self.invalidate(InvalidationCategory::All).await;
        }
        let mut keys = BTreeSet::new();
        for category in categories {
            keys.extend(self.keys_for(*category)?);
        }
        let keys: Vec<CacheKey> = keys.into_iter().collect();
        let invalidated = self.invalidate_keys(&keys).await;
        tracing::info!(
            categories = ?categories,
            keys = keys.len(),
            failed = keys.len() - invalidated,
            "Invalidated cache categories"
        );
        Ok(invalidated)
    }

    async fn invalidate_keys(&self, keys: &[CacheKey]) -> usize {
        let mut invalidated = 0usize;
        for key in keys {
            match self.store.invalidate(key).await {
                Ok(_) => invalidated += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to invalidate cache key");
                }
            }
        }
        invalidated
    }

    /// Register `key` under `category`, then serve it through the store.
    pub async fn get_or_rebuild<T, F, Fut>(
        &self,
        category: InvalidationCategory,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> ResaleResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = ResaleResult<T>> + Send,
    {
        self.register(category, key)?;
        self.store.get_or_rebuild(key, ttl, compute).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryHostCache;
    use resale_core::{CacheConfig, CacheSource, ResaleError};

    const TTL: Duration = Duration::from_secs(300);

    fn bus() -> InvalidationBus<InMemoryHostCache> {
        let host = Arc::new(InMemoryHostCache::default());
        let store = CacheStore::new(host, CacheConfig::default()).unwrap();
        InvalidationBus::new(Arc::new(store))
    }

    async fn seed(bus: &InvalidationBus<InMemoryHostCache>, category: InvalidationCategory, key: &str) {
        bus.register(category, key).unwrap();
        bus.store().set(key, &1u32, TTL).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_category_leaves_others() {
        let bus = bus();
        seed(&bus, InvalidationCategory::Ventas, "ventasList").await;
        seed(&bus, InvalidationCategory::Dashboard, "dashboardStats").await;

        assert_eq!(bus.invalidate(InvalidationCategory::Ventas).await.unwrap(), 1);

        assert_eq!(bus.store().get_raw("ventasList").await.unwrap(), None);
        assert!(bus.store().get_raw("dashboardStats").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_all_covers_every_key_once() {
        let bus = bus();
        seed(&bus, InvalidationCategory::Ventas, "ventasList").await;
        seed(&bus, InvalidationCategory::Dashboard, "dashboardStats").await;
        bus.register(InvalidationCategory::Ventas, "dashboardStats").unwrap();

        assert_eq!(bus.invalidate(InvalidationCategory::All).await.unwrap(), 2);
        assert!(bus.store().host().is_empty());
    }

    #[tokio::test]
    async fn test_registrations_survive_invalidation() {
        let bus = bus();
        seed(&bus, InvalidationCategory::Config, "configMap").await;
        bus.invalidate(InvalidationCategory::Config).await.unwrap();
        bus.store().set("configMap", &2u32, TTL).await.unwrap();

        assert_eq!(bus.invalidate(InvalidationCategory::Config).await.unwrap(), 1);
        assert_eq!(bus.store().get_raw("configMap").await.unwrap(), None);
    }

    #[test]
    fn test_register_is_idempotent_and_rejects_all() {
        let bus = bus();
        bus.register(InvalidationCategory::Ventas, "k").unwrap();
        bus.register(InvalidationCategory::Ventas, "k").unwrap();
        assert_eq!(bus.keys_for(InvalidationCategory::Ventas).unwrap(), vec!["k".to_string()]);
        assert!(bus.register(InvalidationCategory::All, "k").is_err());
    }

    #[tokio::test]
    async fn test_invalidate_empty_category() {
        let bus = bus();
        assert_eq!(bus.invalidate(InvalidationCategory::Operaciones).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_many_dedups() {
        let bus = bus();
        seed(&bus, InvalidationCategory::Ventas, "ventasList").await;
        seed(&bus, InvalidationCategory::Dashboard, "dashboardStats").await;
        bus.register(InvalidationCategory::Ventas, "dashboardStats").unwrap();

        let n = bus
            .invalidate_many(&[InvalidationCategory::Ventas, InvalidationCategory::Dashboard])
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert!(bus.store().host().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_rebuild_registers_key() {
        let bus = bus();
        let read = bus
            .get_or_rebuild(InvalidationCategory::Dashboard, "dashboardStats", TTL, || async {
                Ok::<_, ResaleError>(vec![1u32, 2, 3])
            })
            .await
            .unwrap();
        assert_eq!(read.source, CacheSource::Rebuild);
        assert_eq!(
            bus.keys_for(InvalidationCategory::Dashboard).unwrap(),
            vec!["dashboardStats".to_string()]
        );

        bus.invalidate(InvalidationCategory::Dashboard).await.unwrap();
        let again = bus
            .get_or_rebuild(InvalidationCategory::Dashboard, "dashboardStats", TTL, || async {
                Ok::<_, ResaleError>(vec![4u32])
            })
            .await
            .unwrap();
        assert_eq!(again.value, vec![4]);
        assert!(!again.was_cache_hit());
    }
}
