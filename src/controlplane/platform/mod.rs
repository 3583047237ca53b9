//! Platform Adapters
//!
//! Claim status and credential collaborators for:
//! - Kubernetes (StorageBackendClaim/Content CRDs, Secrets)
//! - Standalone (in-memory, from driver configuration)

pub mod kubernetes;
pub mod standalone;

pub use kubernetes::*;
pub use standalone::*;

use crate::domain::ports::{ClaimStatusRef, CredentialSourceRef};
use std::sync::Arc;

/// Collaborator handles handed to clients and the synchronizer
#[derive(Clone)]
pub struct PlatformHandles {
    pub claims: ClaimStatusRef,
    pub credentials: CredentialSourceRef,
}

/// Factory for creating platform adapters
pub struct PlatformFactory;

impl PlatformFactory {
    pub fn kubernetes(client: kube::Client) -> PlatformHandles {
        let platform = Arc::new(KubernetesPlatform::new(client));
        PlatformHandles {
            claims: platform.clone(),
            credentials: platform,
        }
    }

    pub fn standalone(platform: Arc<StandalonePlatform>) -> PlatformHandles {
        PlatformHandles {
            claims: platform.clone(),
            credentials: platform,
        }
    }
}
