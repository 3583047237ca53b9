//! FusionStorage Backend Plugin
//!
//! Reports backend and pool capabilities of a FusionStorage array over the
//! session client. Pool capacities are reported by the array in MiB and
//! exposed in bytes.

use crate::client::codes::{as_number, describe, result_code};
use crate::client::session::{NFS_SERVICE_CONFIG_PATH, STORAGE_POOL_PATH};
use crate::client::SessionClient;
use crate::domain::ports::{
    BackendPlugin, CapabilityMap, PoolCapabilities, StorageKind, FREE_CAPACITY,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const TOTAL_CAPACITY: &str = "TotalCapacity";
pub const USED_CAPACITY: &str = "UsedCapacity";

const MIB: f64 = 1024.0 * 1024.0;

// =============================================================================
// Pool Listing
// =============================================================================

/// Capacity figures of one storage pool, bytes
#[derive(Debug, Clone, PartialEq)]
pub struct StoragePoolInfo {
    pub name: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl StoragePoolInfo {
    pub fn free_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }

    fn capabilities(&self) -> CapabilityMap {
        CapabilityMap::from([
            (FREE_CAPACITY.to_string(), json!(self.free_bytes())),
            (TOTAL_CAPACITY.to_string(), json!(self.total_bytes)),
            (USED_CAPACITY.to_string(), json!(self.used_bytes)),
        ])
    }
}

fn mib_to_bytes(value: Option<&Value>) -> u64 {
    value
        .and_then(as_number)
        .filter(|v| *v > 0.0)
        .map_or(0, |v| (v * MIB) as u64)
}

/// Parse the `storagePools` array of a pool listing
fn parse_storage_pools(body: &Value) -> Vec<StoragePoolInfo> {
    let Some(pools) = body.get("storagePools").and_then(Value::as_array) else {
        return Vec::new();
    };

    pools
        .iter()
        .filter_map(|pool| {
            let Some(name) = pool.get("poolName").and_then(Value::as_str) else {
                warn!("Skipping storage pool without a name: {}", pool);
                return None;
            };
            Some(StoragePoolInfo {
                name: name.to_string(),
                total_bytes: mib_to_bytes(pool.get("totalCapacity")),
                used_bytes: mib_to_bytes(pool.get("usedCapacity")),
            })
        })
        .collect()
}

fn check_result(operation: &str, body: &Value) -> Result<()> {
    match result_code(body) {
        Some(0) | None => Ok(()),
        Some(code) => Err(Error::Api {
            operation: operation.to_string(),
            code,
            message: describe(body),
        }),
    }
}

// =============================================================================
// FusionStorage Plugin
// =============================================================================

/// Plugin for FusionStorage block and file backends
pub struct FusionStoragePlugin {
    client: SessionClient,
    storage: StorageKind,
}

impl FusionStoragePlugin {
    pub fn new(client: SessionClient, storage: StorageKind) -> Self {
        Self { client, storage }
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Log in to the array
    pub async fn init(&self) -> Result<()> {
        self.client.login().await
    }

    /// List every storage pool of the array
    pub async fn storage_pools(&self) -> Result<Vec<StoragePoolInfo>> {
        let body = self.client.get(STORAGE_POOL_PATH, None).await?;
        check_result("query storage pools", &body)?;
        Ok(parse_storage_pools(&body))
    }

    /// NFS versions enabled on a file backend
    async fn nfs_capabilities(&self) -> Result<CapabilityMap> {
        let body = self.client.get(NFS_SERVICE_CONFIG_PATH, None).await?;
        check_result("query NFS service config", &body)?;

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let enabled = |key: &str| match data.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true" || s == "1",
            Some(other) => as_number(other).is_some_and(|n| n != 0.0),
            None => false,
        };

        Ok(CapabilityMap::from([
            ("SupportNFS3".to_string(), json!(enabled("nfsv3_status"))),
            ("SupportNFS4".to_string(), json!(enabled("nfsv4_status"))),
            ("SupportNFS41".to_string(), json!(enabled("nfsv41_status"))),
        ]))
    }

    fn static_capabilities(&self) -> CapabilityMap {
        let mut capabilities = CapabilityMap::from([
            ("SupportThin".to_string(), json!(true)),
            ("SupportThick".to_string(), json!(false)),
            ("SupportQoS".to_string(), json!(true)),
            ("SupportReplication".to_string(), json!(false)),
        ]);

        match self.storage {
            StorageKind::FusionstorageNas => {
                capabilities.insert("SupportQuota".to_string(), json!(true));
                capabilities.insert("SupportClone".to_string(), json!(false));
            }
            _ => {
                capabilities.insert("SupportClone".to_string(), json!(true));
            }
        }

        capabilities
    }
}

#[async_trait]
impl BackendPlugin for FusionStoragePlugin {
    async fn update_backend_capabilities(&self) -> Result<(CapabilityMap, CapabilityMap)> {
        let mut capabilities = self.static_capabilities();
        if self.storage == StorageKind::FusionstorageNas {
            capabilities.extend(self.nfs_capabilities().await?);
        }

        // FusionStorage reports capacity per pool only
        Ok((capabilities, CapabilityMap::new()))
    }

    async fn update_pool_capabilities(&self, pool_names: &[String]) -> Result<PoolCapabilities> {
        let pools = self.storage_pools().await?;

        let capabilities: PoolCapabilities = pools
            .iter()
            .filter(|pool| pool_names.contains(&pool.name))
            .map(|pool| (pool.name.clone(), pool.capabilities()))
            .collect();

        debug!(
            "Array {} reported {} of {} requested pools",
            self.client.url(),
            capabilities.len(),
            pool_names.len()
        );
        Ok(capabilities)
    }

    async fn logout(&self) {
        self.client.logout().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::{AUTH_TOKEN_HEADER, LOGIN_PATH, LOGOUT_PATH};
    use crate::client::{ClientConfig, RequestLimiter};
    use crate::controlplane::platform::StandalonePlatform;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_storage_pools() {
        let body = json!({
            "result": 0,
            "storagePools": [
                {"poolName": "pool-1", "poolId": 0, "totalCapacity": 100, "usedCapacity": 40},
                {"poolName": "pool-2", "poolId": 1, "totalCapacity": "10.5", "usedCapacity": 20},
                {"poolId": 2, "totalCapacity": 1}
            ]
        });

        let pools = parse_storage_pools(&body);

        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].total_bytes, 100 * 1024 * 1024);
        assert_eq!(pools[0].free_bytes(), 60 * 1024 * 1024);
        assert_eq!(pools[1].total_bytes, (10.5 * MIB) as u64);
        assert_eq!(pools[1].free_bytes(), 0);
        assert!(parse_storage_pools(&json!({"result": 0})).is_empty());
    }

    async fn plugin_for(server: &MockServer, storage: StorageKind) -> FusionStoragePlugin {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(AUTH_TOKEN_HEADER, "token-1")
                    .set_body_json(json!({"result": 0})),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOGOUT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 0})))
            .mount(server)
            .await;

        let platform = Arc::new(StandalonePlatform::new());
        platform.set_password("csi/fusion-a", "s3cret");
        let config = ClientConfig {
            url: server.uri(),
            backend_id: "csi/fusion-a".into(),
            ..Default::default()
        };
        let client = SessionClient::new(
            config,
            Arc::new(RequestLimiter::default()),
            platform.clone(),
            platform,
        );
        let plugin = FusionStoragePlugin::new(client, storage);
        plugin.init().await.unwrap();
        plugin
    }

    #[tokio::test]
    async fn test_pool_capabilities_in_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STORAGE_POOL_PATH))
            .and(header(AUTH_TOKEN_HEADER, "token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": 0,
                "storagePools": [
                    {"poolName": "pool-1", "totalCapacity": 2048, "usedCapacity": 1024},
                    {"poolName": "other", "totalCapacity": 1, "usedCapacity": 0}
                ]
            })))
            .mount(&server)
            .await;
        let plugin = plugin_for(&server, StorageKind::FusionstorageSan).await;

        let capabilities = plugin
            .update_pool_capabilities(&["pool-1".to_string(), "pool-2".to_string()])
            .await
            .unwrap();

        assert_eq!(capabilities.len(), 1);
        let pool = &capabilities["pool-1"];
        assert_eq!(pool[FREE_CAPACITY], json!(1024u64 * 1024 * 1024));
        assert_eq!(pool[TOTAL_CAPACITY], json!(2048u64 * 1024 * 1024));
        assert_eq!(pool[USED_CAPACITY], json!(1024u64 * 1024 * 1024));
    }

    #[tokio::test]
    async fn test_business_error_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(STORAGE_POOL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": 1,
                "errorCode": 50150005,
                "description": "pool service busy"
            })))
            .mount(&server)
            .await;
        let plugin = plugin_for(&server, StorageKind::FusionstorageSan).await;

        let result = plugin.update_pool_capabilities(&["pool-1".to_string()]).await;
        assert_matches!(result, Err(Error::Api { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_san_backend_capabilities_skip_nfs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(NFS_SERVICE_CONFIG_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let plugin = plugin_for(&server, StorageKind::FusionstorageSan).await;

        let (capabilities, capacity) = plugin.update_backend_capabilities().await.unwrap();

        assert_eq!(capabilities["SupportThin"], json!(true));
        assert_eq!(capabilities["SupportClone"], json!(true));
        assert!(!capabilities.contains_key("SupportNFS41"));
        assert!(capacity.is_empty());
    }

    #[tokio::test]
    async fn test_nas_backend_capabilities_include_nfs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(NFS_SERVICE_CONFIG_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"nfsv3_status": true, "nfsv4_status": "false", "nfsv41_status": 1},
                "result": {"code": 0, "description": ""}
            })))
            .mount(&server)
            .await;
        let plugin = plugin_for(&server, StorageKind::FusionstorageNas).await;

        let (capabilities, _) = plugin.update_backend_capabilities().await.unwrap();

        assert_eq!(capabilities["SupportQuota"], json!(true));
        assert_eq!(capabilities["SupportNFS3"], json!(true));
        assert_eq!(capabilities["SupportNFS4"], json!(false));
        assert_eq!(capabilities["SupportNFS41"], json!(true));
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let server = MockServer::start().await;
        let plugin = plugin_for(&server, StorageKind::FusionstorageSan).await;
        assert!(plugin.client().is_logged_in());

        plugin.logout().await;
        assert!(!plugin.client().is_logged_in());
    }
}
