//! Storage Backend Plugins
//!
//! Vendor plugins implementing [`BackendPlugin`](crate::domain::ports::BackendPlugin):
//! - FusionStorage: block and file backends

pub mod fusionstorage;

pub use fusionstorage::*;

use crate::client::{RequestLimiter, SessionClient};
use crate::config::{BackendEntry, DriverConfig};
use crate::controlplane::platform::PlatformHandles;
use crate::domain::ports::StorageKind;
use crate::error::{Error, Result};
use crate::registry::{Backend, BackendRegistry};
use std::sync::Arc;
use tracing::{error, info};

/// Factory building registered backends from configuration
pub struct BackendFactory;

impl BackendFactory {
    /// Build and log in the plugin for one configured backend.
    ///
    /// Each backend gets its own request limiter.
    pub async fn create(
        entry: &BackendEntry,
        namespace: &str,
        platform: &PlatformHandles,
    ) -> Result<Backend> {
        let limiter = Arc::new(RequestLimiter::from_config(
            entry.parallel_setting().as_deref(),
        ));
        let client = SessionClient::new(
            entry.client_config(namespace),
            limiter,
            platform.credentials.clone(),
            platform.claims.clone(),
        );

        let plugin = match entry.storage {
            StorageKind::FusionstorageSan | StorageKind::FusionstorageNas => {
                let plugin = FusionStoragePlugin::new(client, entry.storage);
                plugin.init().await?;
                Arc::new(plugin)
            }
            other => {
                return Err(Error::Configuration(format!(
                    "backend {}: storage kind {} has no plugin",
                    entry.name, other
                )))
            }
        };

        Ok(Backend::new(
            entry.name.clone(),
            entry.storage,
            plugin,
            entry.pools.iter().cloned(),
        ))
    }

    /// Create and register every configured backend.
    ///
    /// A backend that fails to initialize is logged and skipped; returns the
    /// number registered.
    pub async fn register_all(
        config: &DriverConfig,
        registry: &BackendRegistry,
        platform: &PlatformHandles,
    ) -> usize {
        let mut registered = 0;

        for entry in &config.backends {
            let result = match Self::create(entry, &config.namespace, platform).await {
                Ok(backend) => registry.register(backend).map(|_| ()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => registered += 1,
                Err(e) => error!("Failed to register backend {}: {}", entry.name, e),
            }
        }

        info!("Registered {} of {} configured backends", registered, config.backends.len());
        registered
    }
}
