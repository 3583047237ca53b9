//! Backend Registry
//!
//! The set of registered storage backends, their pools and availability.
//!
//! Pool capabilities and the availability flag are only written by the
//! synchronizer pass of their own backend, and a sweep runs at most one pass
//! per backend, so the per-backend locks here are never contended by writers.

use crate::domain::ports::{
    BackendPluginRef, CapabilityMap, StorageKind, FREE_CAPACITY,
};
use crate::client::codes::as_number;
use crate::error::{Error, Result};
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::RegistryEvent;

// =============================================================================
// Pool
// =============================================================================

/// One allocatable capacity pool inside a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    /// Name of the owning backend
    pub parent: String,
    pub capabilities: CapabilityMap,
}

impl Pool {
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            capabilities: CapabilityMap::new(),
        }
    }

    /// Reported free capacity; `None` until the first successful sync
    pub fn free_capacity(&self) -> Option<f64> {
        self.capabilities.get(FREE_CAPACITY).and_then(as_number)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// One registered storage array
pub struct Backend {
    pub name: String,
    pub storage: StorageKind,
    plugin: BackendPluginRef,
    pools: Mutex<Vec<Pool>>,
    available: AtomicBool,
    last_synced: RwLock<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("pools", &self.pool_names())
            .field("available", &self.is_available())
            .finish()
    }
}

impl Backend {
    /// Create an unavailable backend owning the named pools
    pub fn new<I, S>(name: impl Into<String>, storage: StorageKind, plugin: BackendPluginRef, pools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let pools = pools
            .into_iter()
            .map(|pool| Pool::new(pool, name.clone()))
            .collect();

        Self {
            name,
            storage,
            plugin,
            pools: Mutex::new(pools),
            available: AtomicBool::new(false),
            last_synced: RwLock::new(None),
        }
    }

    pub fn plugin(&self) -> &BackendPluginRef {
        &self.plugin
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.pools.lock().iter().map(|p| p.name.clone()).collect()
    }

    /// Snapshot of the pools
    pub fn pools(&self) -> Vec<Pool> {
        self.pools.lock().clone()
    }

    /// Pools whose last reported free capacity is above zero
    pub fn available_pools(&self) -> Vec<Pool> {
        self.pools
            .lock()
            .iter()
            .filter(|p| p.free_capacity().is_some_and(|free| free > 0.0))
            .cloned()
            .collect()
    }

    pub(crate) fn with_pools_mut<R>(&self, f: impl FnOnce(&mut Vec<Pool>) -> R) -> R {
        f(&mut self.pools.lock())
    }

    /// True iff the last synchronization of this backend succeeded
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Returns the previous value
    fn swap_available(&self, available: bool) -> bool {
        self.available.swap(available, Ordering::AcqRel)
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        *self.last_synced.read()
    }

    pub(crate) fn mark_synced(&self) {
        *self.last_synced.write() = Some(Utc::now());
    }

    /// Serializable summary
    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name.clone(),
            storage: self.storage,
            available: self.is_available(),
            last_synced: self.last_synced(),
            pools: self.pools(),
        }
    }
}

/// Point-in-time view of a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub name: String,
    pub storage: StorageKind,
    pub available: bool,
    pub last_synced: Option<DateTime<Utc>>,
    pub pools: Vec<Pool>,
}

// =============================================================================
// Backend Registry
// =============================================================================

/// Registry of all backends known to the driver
pub struct BackendRegistry {
    backends: RwLock<BTreeMap<String, Arc<Backend>>>,
    /// Event broadcaster
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(1024);
        Arc::new(Self {
            backends: RwLock::new(BTreeMap::new()),
            event_sender,
        })
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Register a backend; names are unique
    pub fn register(&self, backend: Backend) -> Result<Arc<Backend>> {
        let backend = Arc::new(backend);
        let pool_count = backend.pool_names().len() as u32;
        {
            let mut backends = self.backends.write();
            if backends.contains_key(&backend.name) {
                return Err(Error::BackendAlreadyRegistered {
                    name: backend.name.clone(),
                });
            }
            backends.insert(backend.name.clone(), backend.clone());
        }

        info!("Registered backend {} with {} pools", backend.name, pool_count);
        self.refresh_gauges();
        let _ = self.event_sender.send(RegistryEvent::BackendRegistered {
            name: backend.name.clone(),
            pool_count,
        });

        Ok(backend)
    }

    /// Remove a backend and log out of its array
    pub async fn remove(&self, name: &str) -> Option<Arc<Backend>> {
        let backend = self.backends.write().remove(name)?;

        backend.plugin().logout().await;
        backend.swap_available(false);

        info!("Removed backend {}", name);
        self.refresh_gauges();
        let _ = self.event_sender.send(RegistryEvent::BackendRemoved {
            name: name.to_string(),
        });

        Some(backend)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.read().contains_key(name)
    }

    /// Names in registry order
    pub fn names(&self) -> Vec<String> {
        self.backends.read().keys().cloned().collect()
    }

    /// All backends in registry order
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }

    pub fn available_count(&self) -> usize {
        self.backends
            .read()
            .values()
            .filter(|b| b.is_available())
            .count()
    }

    /// Set a backend's availability, announcing flips
    pub fn set_available(&self, backend: &Backend, available: bool) {
        if backend.swap_available(available) != available {
            self.refresh_gauges();
            let _ = self.event_sender.send(RegistryEvent::AvailabilityChanged {
                name: backend.name.clone(),
                available,
            });
        }
    }

    /// Log out of every backend and mark them unavailable
    pub async fn logout_all(&self) {
        for backend in self.snapshot() {
            info!("Start to logout the backend {}", backend.name);
            backend.plugin().logout().await;
            self.set_available(&backend, false);
        }
    }

    fn refresh_gauges(&self) {
        let metrics = metrics::global();
        metrics.backends_registered.set(self.len() as i64);
        metrics.backends_available.set(self.available_count() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{BackendPlugin, PoolCapabilities};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingPlugin {
        logouts: AtomicUsize,
    }

    #[async_trait]
    impl BackendPlugin for CountingPlugin {
        async fn update_backend_capabilities(&self) -> Result<(CapabilityMap, CapabilityMap)> {
            Ok((CapabilityMap::new(), CapabilityMap::new()))
        }

        async fn update_pool_capabilities(&self, _pool_names: &[String]) -> Result<PoolCapabilities> {
            Ok(PoolCapabilities::new())
        }

        async fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn backend(name: &str, plugin: Arc<CountingPlugin>) -> Backend {
        Backend::new(name, StorageKind::FusionstorageSan, plugin, ["p1", "p2"])
    }

    #[test]
    fn test_register_and_get() {
        let registry = BackendRegistry::new();
        let plugin = Arc::new(CountingPlugin::default());

        let registered = registry.register(backend("b1", plugin)).unwrap();
        assert!(!registered.is_available());
        assert_eq!(registered.pool_names(), vec!["p1", "p2"]);
        assert_eq!(registered.pools()[0].parent, "b1");

        assert!(registry.contains("b1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["b1"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = BackendRegistry::new();
        let plugin = Arc::new(CountingPlugin::default());

        registry.register(backend("b1", plugin.clone())).unwrap();
        let result = registry.register(backend("b1", plugin));
        assert!(matches!(result, Err(Error::BackendAlreadyRegistered { .. })));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = BackendRegistry::new();
        let mut events = registry.subscribe();

        assert!(tokio_test::block_on(registry.remove("missing")).is_none());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_logs_out_and_emits_event() {
        let registry = BackendRegistry::new();
        let mut events = registry.subscribe();
        let plugin = Arc::new(CountingPlugin::default());

        registry.register(backend("b1", plugin.clone())).unwrap();
        let removed = registry.remove("b1").await.unwrap();

        assert_eq!(removed.name, "b1");
        assert!(!registry.contains("b1"));
        assert_eq!(plugin.logouts.load(Ordering::SeqCst), 1);
        assert!(registry.remove("b1").await.is_none());

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::BackendRegistered { name: "b1".into(), pool_count: 2 }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::BackendRemoved { name: "b1".into() }
        );
    }

    #[tokio::test]
    async fn test_availability_flip_emits_once() {
        let registry = BackendRegistry::new();
        let b1 = registry
            .register(backend("b1", Arc::new(CountingPlugin::default())))
            .unwrap();
        let mut events = registry.subscribe();

        registry.set_available(&b1, true);
        registry.set_available(&b1, true);
        registry.set_available(&b1, false);

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::AvailabilityChanged { name: "b1".into(), available: true }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::AvailabilityChanged { name: "b1".into(), available: false }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_logout_all_marks_unavailable() {
        let registry = BackendRegistry::new();
        let plugin = Arc::new(CountingPlugin::default());
        let b1 = registry.register(backend("b1", plugin.clone())).unwrap();
        let b2 = registry.register(backend("b2", plugin.clone())).unwrap();
        registry.set_available(&b1, true);
        registry.set_available(&b2, true);
        assert_eq!(registry.available_count(), 2);

        registry.logout_all().await;

        assert_eq!(plugin.logouts.load(Ordering::SeqCst), 2);
        assert_eq!(registry.available_count(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_available_pools_filters_exhausted() {
        let b1 = backend("b1", Arc::new(CountingPlugin::default()));
        b1.with_pools_mut(|pools| {
            pools[0].capabilities.insert(FREE_CAPACITY.into(), json!(100));
            pools[1].capabilities.insert(FREE_CAPACITY.into(), json!(0));
        });

        let available = b1.available_pools();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "p1");
        assert_eq!(available[0].free_capacity(), Some(100.0));
    }
}
