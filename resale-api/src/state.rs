//! Shared application state for the action layer.

use std::sync::Arc;
use std::time::Instant;

use resale_core::{ResaleConfig, ResaleResult, SchemaRegistry};
use resale_storage::{
    BackingStore, CacheStore, FixedStore, HostCache, HostLock, InMemoryHostCache,
    InMemoryHostLock, InMemoryStore, InvalidationBus, SchemaReconciler, StoreConnector,
};

use crate::aggregation::DashboardService;
use crate::schema::default_registry;

/// Cache and invalidation bus over whatever host cache the process runs with.
pub type SharedBus = InvalidationBus<dyn HostCache>;

/// Application-wide state shared by every action handler.
pub struct AppState {
    pub config: ResaleConfig,
    pub store: Arc<dyn BackingStore>,
    pub bus: Arc<SharedBus>,
    pub reconciler: SchemaReconciler<dyn HostLock>,
    pub dashboard: DashboardService<dyn HostCache>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services together.
    ///
    /// Fails if the config is invalid or the store is not configured.
    pub fn new(
        config: ResaleConfig,
        connector: Arc<dyn StoreConnector>,
        host: Arc<dyn HostCache>,
        lock: Arc<dyn HostLock>,
        registry: SchemaRegistry,
    ) -> ResaleResult<Self> {
        config.validate()?;
        let store = connector.connect()?;

        let cache = Arc::new(CacheStore::new(host, config.cache.clone())?);
        let bus = Arc::new(InvalidationBus::new(cache));
        let reconciler = SchemaReconciler::new(
            Arc::new(registry),
            connector,
            lock,
            config.reconcile.clone(),
        );
        let dashboard = DashboardService::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            config.cache.default_ttl,
        );

        Ok(Self {
            config,
            store,
            bus,
            reconciler,
            dashboard,
            start_time: Instant::now(),
        })
    }

    /// Single-process state: in-memory store, cache and lock.
    pub fn in_memory(config: ResaleConfig) -> ResaleResult<Self> {
        let store: Arc<dyn BackingStore> = Arc::new(InMemoryStore::new());
        Self::new(
            config,
            Arc::new(FixedStore::new(store)),
            Arc::new(InMemoryHostCache::default()),
            Arc::new(InMemoryHostLock::new()),
            default_registry()?,
        )
    }
}
