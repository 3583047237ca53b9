//! Status API Server
//!
//! Serves the REST status API until the shutdown token is cancelled.

use crate::controlplane::sync::CapabilitySynchronizer;
use crate::error::{Error, Result};
use crate::registry::BackendRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST status server
pub struct ApiServer {
    config: ApiServerConfig,
    registry: Arc<BackendRegistry>,
    synchronizer: CapabilitySynchronizer,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        registry: Arc<BackendRegistry>,
        synchronizer: CapabilitySynchronizer,
    ) -> Self {
        Self {
            config,
            registry,
            synchronizer,
        }
    }

    /// Run the API server until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.rest_addr;
        let app = RestRouter::new(self.registry, self.synchronizer).build();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

        info!("REST API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }
}
