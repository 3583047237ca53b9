//! Capability Synchronizer
//!
//! Pulls backend-level and pool-level capabilities from each backend's plugin
//! and merges them into the registry. Two sweeps are provided:
//!
//! - [`CapabilitySynchronizer::sync_all`]: sequential, strict and fail-fast,
//!   used at startup.
//! - [`CapabilitySynchronizer::sync_all_async`]: one task per backend, failures
//!   isolated per backend and reflected in its availability.
//!
//! Each sweep runs at most one pass per backend, so a backend's pools and
//! availability flag have a single writer at any time.

use crate::domain::ports::{
    claim_key, CapabilityMap, CapabilityValue, ClaimStatusRef, PoolCapabilities, StorageKind,
    FREE_CAPACITY,
};
use crate::error::{Error, Result};
use crate::metrics;
use crate::registry::{Backend, BackendRegistry, Pool};
use backoff::ExponentialBackoff;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace the backend claims live in
    pub namespace: String,
    /// Period of the asynchronous sweep
    pub interval: Duration,
    /// Give up retrying the startup sweep after this long
    pub startup_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: "huawei-csi".to_string(),
            interval: Duration::from_secs(60),
            startup_timeout: Duration::from_secs(300),
        }
    }
}

// =============================================================================
// Merge
// =============================================================================

fn show_value(value: Option<&CapabilityValue>) -> String {
    value.map_or_else(|| "<none>".to_string(), ToString::to_string)
}

/// Merge freshly reported capabilities into a backend's pools.
///
/// Backend-level keys are copied into every pool. Pool-level keys are copied
/// from the pool's entry in `pool_caps`; a pool missing from `pool_caps` keeps
/// its capabilities but gets `FreeCapacity = 0`. Storage kinds without
/// per-pool capabilities only receive the backend-level keys.
///
/// Returns the number of keys that changed.
pub fn merge_capabilities(
    storage: StorageKind,
    pools: &mut [Pool],
    backend_caps: &CapabilityMap,
    pool_caps: &PoolCapabilities,
) -> usize {
    let mut changes = 0;

    for pool in pools.iter_mut() {
        for (key, value) in backend_caps {
            let current = pool.capabilities.get(key);
            if current != Some(value) {
                info!(
                    "Update backend capability [{}] of pool [{}] of backend [{}] from {} to {}",
                    key,
                    pool.name,
                    pool.parent,
                    show_value(current),
                    value
                );
                pool.capabilities.insert(key.clone(), value.clone());
                changes += 1;
            }
        }

        if !storage.has_pool_capabilities() {
            continue;
        }

        let Some(capabilities) = pool_caps.get(&pool.name) else {
            warn!(
                "Pool {} of backend {} does not exist, set it unavailable",
                pool.name, pool.parent
            );
            let exhausted = CapabilityValue::from(0);
            if pool.capabilities.get(FREE_CAPACITY) != Some(&exhausted) {
                pool.capabilities.insert(FREE_CAPACITY.to_string(), exhausted);
                changes += 1;
            }
            continue;
        };

        for (key, value) in capabilities {
            let current = pool.capabilities.get(key);
            if current == Some(value) {
                continue;
            }

            if key == FREE_CAPACITY {
                debug!(
                    "Update pool capability [{}] of pool [{}] of backend [{}] from {} to {}",
                    key,
                    pool.name,
                    pool.parent,
                    show_value(current),
                    value
                );
            } else {
                info!(
                    "Update pool capability [{}] of pool [{}] of backend [{}] from {} to {}",
                    key,
                    pool.name,
                    pool.parent,
                    show_value(current),
                    value
                );
            }
            pool.capabilities.insert(key.clone(), value.clone());
            changes += 1;
        }
    }

    changes
}

// =============================================================================
// Sync Reports
// =============================================================================

/// Result of one backend's pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Capabilities were refreshed
    Synced,
    /// The claim was offline and the backend was deregistered
    Removed,
}

/// Per-backend results of an asynchronous sweep
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<FailedSync>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSync {
    pub backend: String,
    pub error: String,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Capability Synchronizer
// =============================================================================

/// Refreshes registered backends from their arrays
#[derive(Clone)]
pub struct CapabilitySynchronizer {
    config: SyncConfig,
    registry: Arc<BackendRegistry>,
    claims: ClaimStatusRef,
}

impl CapabilitySynchronizer {
    pub fn new(config: SyncConfig, registry: Arc<BackendRegistry>, claims: ClaimStatusRef) -> Self {
        Self {
            config,
            registry,
            claims,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Refresh one backend.
    ///
    /// An offline claim deregisters the backend and is not an error. In
    /// strict mode a pool listing that misses any requested pool fails the
    /// pass before anything is merged.
    pub async fn sync_one_backend(&self, backend: &Backend, strict: bool) -> Result<SyncOutcome> {
        let backend_id = claim_key(&self.config.namespace, &backend.name);
        let online = self.claims.is_claim_online(&backend_id).await.map_err(|e| {
            error!("Cannot get online status of claim {}: {}", backend_id, e);
            e
        })?;

        if !online {
            self.registry.remove(&backend.name).await;
            info!(
                "Claim [{}] online status is false, removed backend [{}]",
                backend_id, backend.name
            );
            return Ok(SyncOutcome::Removed);
        }

        let plugin = backend.plugin();
        let (backend_caps, _capacity) = plugin.update_backend_capabilities().await.map_err(|e| {
            error!("Cannot update backend {} capabilities: {}", backend.name, e);
            e
        })?;

        let pool_names = backend.pool_names();
        let pool_caps = plugin.update_pool_capabilities(&pool_names).await.map_err(|e| {
            error!("Cannot update pool capabilities of backend {}: {}", backend.name, e);
            e
        })?;

        if strict {
            let returned = pool_names.iter().filter(|name| pool_caps.contains_key(*name)).count();
            if returned < pool_names.len() {
                error!("There're pools not available for backend {}", backend.name);
                return Err(Error::PoolsUnavailable {
                    backend: backend.name.clone(),
                    requested: pool_names.len(),
                    returned,
                });
            }
        }

        let changes = backend.with_pools_mut(|pools| {
            merge_capabilities(backend.storage, pools, &backend_caps, &pool_caps)
        });
        backend.mark_synced();
        debug!("Synced backend {} with {} capability changes", backend.name, changes);

        Ok(SyncOutcome::Synced)
    }

    /// Strict sequential sweep; stops at the first failing backend.
    ///
    /// Backends synced before the failure are marked available.
    pub async fn sync_all(&self, strict: bool) -> Result<()> {
        debug!("Start synchronous capability sweep");
        let mode = if strict { "strict" } else { "sync" };

        for backend in self.registry.snapshot() {
            match self.sync_one_backend(&backend, strict).await {
                Ok(SyncOutcome::Synced) => {
                    self.registry.set_available(&backend, true);
                    metrics::global().record_sync(mode, "success");
                }
                Ok(SyncOutcome::Removed) => {
                    metrics::global().record_sync(mode, "removed");
                }
                Err(e) => {
                    metrics::global().record_sync(mode, "failure");
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Concurrent sweep; one task per backend, returns once all finished.
    ///
    /// A failing or panicking task only marks its own backend unavailable.
    pub async fn sync_all_async(&self) -> SyncReport {
        debug!("Start asynchronous capability sweep");
        let backends = self.registry.snapshot();

        let handles = backends.iter().map(|backend| {
            let this = self.clone();
            let backend = backend.clone();
            tokio::spawn(async move { this.sync_one_backend(&backend, false).await })
        });
        let results = join_all(handles).await;

        let mut report = SyncReport::default();
        for (backend, result) in backends.iter().zip(results) {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!("Runtime error caught in sync task of backend {}: {}", backend.name, join_error);
                    Err(Error::SyncAborted {
                        backend: backend.name.clone(),
                        reason: join_error.to_string(),
                    })
                }
            };

            match outcome {
                Ok(SyncOutcome::Synced) => {
                    self.registry.set_available(backend, true);
                    metrics::global().record_sync("async", "success");
                    report.synced.push(backend.name.clone());
                }
                Ok(SyncOutcome::Removed) => {
                    metrics::global().record_sync("async", "removed");
                    report.removed.push(backend.name.clone());
                }
                Err(e) => {
                    warn!("Update backend {} capabilities failed, error: {}", backend.name, e);
                    self.registry.set_available(backend, false);
                    metrics::global().record_sync("async", "failure");
                    report.failed.push(FailedSync {
                        backend: backend.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Startup sweep: strict `sync_all`, retried with exponential backoff
    /// until it succeeds, a non-retryable error occurs, or the startup
    /// timeout elapses.
    pub async fn initial_sync(&self) -> Result<()> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.config.startup_timeout),
            ..Default::default()
        };

        backoff::future::retry(policy, || async {
            self.sync_all(true).await.map_err(|e| {
                if e.is_retryable() {
                    warn!("Startup capability sync failed, retrying: {}", e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    /// Run the asynchronous sweep every `interval` until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup sweep already ran.
        ticker.tick().await;

        info!("Capability sync loop started, interval {:?}", self.config.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Capability sync loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = self.sync_all_async().await;
                    if !report.is_clean() {
                        warn!("{} backends failed to sync", report.failed.len());
                    }
                }
            }
        }
    }
}
