//! Standalone Platform Adapter
//!
//! In-memory claim status and credentials for running the backend manager
//! without a Kubernetes cluster. Claims are online until marked otherwise.

use crate::domain::ports::{claim_key, ClaimStatus, CredentialSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::info;

/// In-memory adapter backed by driver configuration
#[derive(Debug, Default)]
pub struct StandalonePlatform {
    /// Passwords by backend id
    passwords: RwLock<BTreeMap<String, String>>,
    /// Passwords by `namespace/name` secret key
    secrets: RwLock<BTreeMap<String, String>>,
    /// Claims explicitly marked; absent means online
    online: RwLock<BTreeMap<String, bool>>,
}

impl StandalonePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, backend_id: &str, password: &str) {
        self.passwords
            .write()
            .insert(backend_id.to_string(), password.to_string());
    }

    pub fn set_secret(&self, namespace: &str, name: &str, password: &str) {
        self.secrets
            .write()
            .insert(claim_key(namespace, name), password.to_string());
    }

    pub fn set_online(&self, backend_id: &str, online: bool) {
        self.online.write().insert(backend_id.to_string(), online);
    }
}

#[async_trait]
impl ClaimStatus for StandalonePlatform {
    async fn is_claim_online(&self, backend_id: &str) -> Result<bool> {
        Ok(self.online.read().get(backend_id).copied().unwrap_or(true))
    }

    async fn set_backend_online_status(&self, backend_id: &str, online: bool) -> Result<()> {
        info!("Set backend {} online status to {}", backend_id, online);
        self.set_online(backend_id, online);
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for StandalonePlatform {
    async fn password_by_backend_id(&self, backend_id: &str) -> Result<String> {
        self.passwords
            .read()
            .get(backend_id)
            .cloned()
            .ok_or_else(|| Error::Credential {
                backend_id: backend_id.to_string(),
                reason: "no password configured".to_string(),
            })
    }

    async fn password_by_secret(&self, name: &str, namespace: &str) -> Result<String> {
        let key = claim_key(namespace, name);
        self.secrets
            .read()
            .get(&key)
            .cloned()
            .ok_or(Error::ResourceNotFound {
                kind: "Secret".to_string(),
                name: key,
            })
    }
}
