//! Domain Ports - Core trait definitions for the backend manager
//!
//! These traits define the boundaries between capability synchronization and
//! external systems: vendor plugins talking to storage arrays, the cluster
//! holding backend claims, and the credential store.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Capability Types
// =============================================================================

/// Capability key holding the authoritative free-capacity signal of a pool
pub const FREE_CAPACITY: &str = "FreeCapacity";

/// Heterogeneous capability values (booleans, numbers, strings, nested maps)
pub type CapabilityValue = serde_json::Value;

/// Capability key to value mapping
pub type CapabilityMap = BTreeMap<String, CapabilityValue>;

/// Pool name to capability mapping returned by a pool refresh
pub type PoolCapabilities = BTreeMap<String, CapabilityMap>;

/// Kind of storage a backend exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    OceanstorSan,
    OceanstorNas,
    OceanstorDtree,
    FusionstorageSan,
    FusionstorageNas,
}

impl StorageKind {
    /// Whether pools of this kind carry their own capability set.
    ///
    /// DTree backends expose a single parent file system; their pools only
    /// inherit backend-level capabilities.
    pub fn has_pool_capabilities(&self) -> bool {
        !matches!(self, StorageKind::OceanstorDtree)
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::OceanstorSan => write!(f, "oceanstor-san"),
            StorageKind::OceanstorNas => write!(f, "oceanstor-nas"),
            StorageKind::OceanstorDtree => write!(f, "oceanstor-dtree"),
            StorageKind::FusionstorageSan => write!(f, "fusionstorage-san"),
            StorageKind::FusionstorageNas => write!(f, "fusionstorage-nas"),
        }
    }
}

/// Build the namespaced identity of a backend claim (`namespace/name`)
pub fn claim_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Split a `namespace/name` identity; a bare name yields an empty namespace
pub fn split_claim_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((namespace, name)) => (namespace, name),
        None => ("", key),
    }
}

// =============================================================================
// Backend Plugin Port
// =============================================================================

/// Vendor plugin driving one registered storage array
#[async_trait]
pub trait BackendPlugin: Send + Sync {
    /// Refresh backend-level capabilities and capacity
    async fn update_backend_capabilities(&self) -> Result<(CapabilityMap, CapabilityMap)>;

    /// Refresh the capabilities of the named pools.
    ///
    /// Pools the array no longer reports are simply absent from the result.
    async fn update_pool_capabilities(&self, pool_names: &[String]) -> Result<PoolCapabilities>;

    /// Tear down the plugin's array session. Best-effort.
    async fn logout(&self);
}

// =============================================================================
// Cluster Claim Port
// =============================================================================

/// Port onto the cluster objects that represent backend registrations
#[async_trait]
pub trait ClaimStatus: Send + Sync {
    /// Whether the backend's claim is still online
    async fn is_claim_online(&self, backend_id: &str) -> Result<bool>;

    /// Record the online status of the content bound to the backend's claim
    async fn set_backend_online_status(&self, backend_id: &str, online: bool) -> Result<()>;
}

// =============================================================================
// Credential Port
// =============================================================================

/// Port onto the credential store holding array passwords
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current password of a registered backend
    async fn password_by_backend_id(&self, backend_id: &str) -> Result<String>;

    /// Password held by an explicitly named secret
    async fn password_by_secret(&self, name: &str, namespace: &str) -> Result<String>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type BackendPluginRef = Arc<dyn BackendPlugin>;
pub type ClaimStatusRef = Arc<dyn ClaimStatus>;
pub type CredentialSourceRef = Arc<dyn CredentialSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_display() {
        assert_eq!(format!("{}", StorageKind::OceanstorDtree), "oceanstor-dtree");
        assert_eq!(format!("{}", StorageKind::FusionstorageSan), "fusionstorage-san");
    }

    #[test]
    fn test_storage_kind_serde_matches_display() {
        let kind: StorageKind = serde_json::from_str("\"fusionstorage-nas\"").unwrap();
        assert_eq!(kind, StorageKind::FusionstorageNas);
        assert_eq!(
            serde_json::to_string(&StorageKind::OceanstorSan).unwrap(),
            "\"oceanstor-san\""
        );
    }

    #[test]
    fn test_pool_capabilities_applicability() {
        assert!(!StorageKind::OceanstorDtree.has_pool_capabilities());
        assert!(StorageKind::OceanstorSan.has_pool_capabilities());
        assert!(StorageKind::FusionstorageNas.has_pool_capabilities());
    }

    #[test]
    fn test_claim_key_round_trip() {
        let key = claim_key("huawei-csi", "backend-a");
        assert_eq!(key, "huawei-csi/backend-a");
        assert_eq!(split_claim_key(&key), ("huawei-csi", "backend-a"));
        assert_eq!(split_claim_key("bare"), ("", "bare"));
    }
}
