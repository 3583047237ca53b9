//! REST API Handlers
//!
//! Read-only status of registered backends plus an on-demand sync trigger.

use crate::controlplane::sync::{CapabilitySynchronizer, SyncReport};
use crate::metrics;
use crate::registry::{BackendRegistry, BackendStatus};
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Response Types
// =============================================================================

/// Backend list response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendListResponse {
    pub total: usize,
    pub available: usize,
    pub backends: Vec<BackendStatus>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    registry: Arc<BackendRegistry>,
    synchronizer: CapabilitySynchronizer,
}

impl RestRouter {
    pub fn new(registry: Arc<BackendRegistry>, synchronizer: CapabilitySynchronizer) -> Self {
        Self {
            registry,
            synchronizer,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            registry: self.registry,
            synchronizer: self.synchronizer,
        };

        Router::new()
            // Backend endpoints
            .route("/v1/backends", get(list_backends))
            .route("/v1/backends/:name", get(get_backend))
            .route("/v1/sync", post(trigger_sync))
            // Operational endpoints
            .route("/metrics", get(export_metrics))
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<BackendRegistry>,
    synchronizer: CapabilitySynchronizer,
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_backends(State(state): State<AppState>) -> impl IntoResponse {
    let backends: Vec<BackendStatus> = state
        .registry
        .snapshot()
        .iter()
        .map(|backend| backend.status())
        .collect();

    Json(BackendListResponse {
        total: backends.len(),
        available: backends.iter().filter(|b| b.available).count(),
        backends,
    })
}

async fn get_backend(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&name) {
        Some(backend) => (StatusCode::OK, Json(backend.status())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiErrorResponse {
                error: "backend_not_found".into(),
                message: format!("Backend not found: {}", name),
                details: None,
            }),
        )
            .into_response(),
    }
}

/// Run an asynchronous sweep now and report per-backend outcomes
async fn trigger_sync(State(state): State<AppState>) -> Json<SyncReport> {
    info!("Capability sync requested through the API");
    Json(state.synchronizer.sync_all_async().await)
}

async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiErrorResponse {
                    error: "metrics_failed".into(),
                    message: e.to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready once at least one backend is available
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.available_count() > 0 {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no backends available")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::platform::StandalonePlatform;
    use crate::controlplane::sync::SyncConfig;
    use crate::domain::ports::{
        BackendPlugin, CapabilityMap, PoolCapabilities, StorageKind,
    };
    use crate::error::Result;
    use crate::registry::Backend;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct FixedPlugin;

    #[async_trait]
    impl BackendPlugin for FixedPlugin {
        async fn update_backend_capabilities(&self) -> Result<(CapabilityMap, CapabilityMap)> {
            Ok((
                CapabilityMap::from([("SupportThin".to_string(), json!(true))]),
                CapabilityMap::new(),
            ))
        }

        async fn update_pool_capabilities(&self, pool_names: &[String]) -> Result<PoolCapabilities> {
            Ok(pool_names
                .iter()
                .map(|name| {
                    (
                        name.clone(),
                        CapabilityMap::from([("FreeCapacity".to_string(), json!(42))]),
                    )
                })
                .collect())
        }

        async fn logout(&self) {}
    }

    fn router() -> (Router, Arc<BackendRegistry>) {
        let registry = BackendRegistry::new();
        registry
            .register(Backend::new(
                "fusion-a",
                StorageKind::FusionstorageSan,
                Arc::new(FixedPlugin),
                ["pool-1"],
            ))
            .unwrap();
        let synchronizer = CapabilitySynchronizer::new(
            SyncConfig::default(),
            registry.clone(),
            Arc::new(StandalonePlatform::new()),
        );
        (RestRouter::new(registry.clone(), synchronizer).build(), registry)
    }

    async fn send(router: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = router();
        let (status, body) = send(router, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_ready_follows_availability() {
        let (router, registry) = router();
        let (status, _) = send(router.clone(), "GET", "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let backend = registry.get("fusion-a").unwrap();
        registry.set_available(&backend, true);
        let (status, _) = send(router, "GET", "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sync_then_inspect_backend() {
        let (router, _) = router();

        let (status, body) = send(router.clone(), "POST", "/v1/sync").await;
        assert_eq!(status, StatusCode::OK);
        let report: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["synced"], json!(["fusion-a"]));

        let (status, body) = send(router.clone(), "GET", "/v1/backends/fusion-a").await;
        assert_eq!(status, StatusCode::OK);
        let backend: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(backend["available"], json!(true));
        assert_eq!(backend["storage"], json!("fusionstorage-san"));
        assert_eq!(
            backend["pools"][0]["capabilities"],
            json!({"FreeCapacity": 42, "SupportThin": true})
        );

        let (_, body) = send(router, "GET", "/v1/backends").await;
        let list: BackendListResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.available, 1);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let (router, _) = router();
        let (status, body) = send(router, "GET", "/v1/backends/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ApiErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "backend_not_found");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (router, _) = router();
        metrics::global().record_sync("async", "success");
        let (status, body) = send(router, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body)
            .unwrap()
            .contains("backend_manager_sync_results_total"));
    }
}
