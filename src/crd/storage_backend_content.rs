//! StorageBackendContent CRD
//!
//! Cluster-scoped record of a registered array, bound to exactly one claim.
//! `spec.online` is the operator's switch; `status.online` is what the
//! content controller last observed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// StorageBackendContent describes one bound storage array
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageBackendContent",
    plural = "storagebackendcontents",
    shortname = "sbct",
    status = "StorageBackendContentStatus",
    printcolumn = r#"{"name": "Claim", "type": "string", "jsonPath": ".spec.backendClaim"}"#,
    printcolumn = r#"{"name": "Online", "type": "boolean", "jsonPath": ".status.online"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentSpec {
    pub provider: String,

    /// `namespace/name` of the bound claim
    pub backend_claim: String,

    #[serde(default)]
    pub config_map_meta: String,

    #[serde(default)]
    pub secret_meta: String,

    /// Whether the backend should be served
    #[serde(default = "default_online")]
    pub online: bool,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_online() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendContentStatus {
    #[serde(default)]
    pub online: bool,

    #[serde(default)]
    pub vendor_name: String,

    #[serde(default)]
    pub provider_version: String,

    /// Last reported pool capacities, bytes
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
}

impl StorageBackendContent {
    /// Observed online state, falling back to the desired one before the
    /// first status update
    pub fn is_online(&self) -> bool {
        match &self.status {
            Some(status) => self.spec.online && status.online,
            None => self.spec.online,
        }
    }
}
