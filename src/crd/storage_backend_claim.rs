//! StorageBackendClaim CRD
//!
//! A namespaced request to register one storage array with the driver. Once
//! accepted it is bound to a cluster-scoped StorageBackendContent.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// StorageBackendClaim CRD
// =============================================================================

/// StorageBackendClaim registers a storage array with the backend manager
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageBackendClaim",
    plural = "storagebackendclaims",
    shortname = "sbc",
    status = "StorageBackendClaimStatus",
    printcolumn = r#"{"name": "Storage", "type": "string", "jsonPath": ".status.storageType"}"#,
    printcolumn = r#"{"name": "Content", "type": "string", "jsonPath": ".status.boundContentName"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendClaimSpec {
    /// Name of the provisioner handling this backend
    pub provider: String,

    /// `namespace/name` of the ConfigMap holding the backend configuration
    pub config_map_meta: String,

    /// `namespace/name` of the Secret holding the array credentials
    #[serde(default)]
    pub secret_meta: String,

    /// Parallel request count for the array client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_client_threads: Option<String>,
}

/// Claim lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum ClaimPhase {
    #[default]
    Pending,
    Bound,
    Failed,
}

/// StorageBackendClaim status
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendClaimStatus {
    #[serde(default)]
    pub phase: ClaimPhase,

    /// Storage kind reported by the array
    #[serde(default)]
    pub storage_type: String,

    /// Access protocol
    #[serde(default)]
    pub protocol: String,

    /// Secret in effect, `namespace/name`
    #[serde(default)]
    pub secret_meta: String,

    /// Name of the bound StorageBackendContent
    #[serde(default)]
    pub bound_content_name: String,
}

impl StorageBackendClaim {
    /// Bound content name, if bound
    pub fn bound_content(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.bound_content_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Secret reference, preferring the one recorded in status
    pub fn secret_ref(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.secret_meta.as_str())
            .filter(|meta| !meta.is_empty())
            .or(Some(self.spec.secret_meta.as_str()).filter(|meta| !meta.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(status: Option<StorageBackendClaimStatus>) -> StorageBackendClaim {
        let mut claim = StorageBackendClaim::new(
            "fusion-a",
            StorageBackendClaimSpec {
                provider: "csi.billyronks.io".into(),
                config_map_meta: "csi/fusion-a".into(),
                secret_meta: "csi/fusion-a-secret".into(),
                max_client_threads: None,
            },
        );
        claim.status = status;
        claim
    }

    #[test]
    fn test_unbound_claim() {
        let claim = claim(None);
        assert_eq!(claim.bound_content(), None);
        assert_eq!(claim.secret_ref(), Some("csi/fusion-a-secret"));
    }

    #[test]
    fn test_status_secret_wins() {
        let claim = claim(Some(StorageBackendClaimStatus {
            phase: ClaimPhase::Bound,
            secret_meta: "csi/rotated".into(),
            bound_content_name: "content-1".into(),
            ..Default::default()
        }));
        assert_eq!(claim.bound_content(), Some("content-1"));
        assert_eq!(claim.secret_ref(), Some("csi/rotated"));
    }
}
