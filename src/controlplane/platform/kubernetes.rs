//! Kubernetes Platform Adapter
//!
//! Resolves claim status through the StorageBackendClaim / StorageBackendContent
//! pair and reads array passwords from Secrets.

use crate::crd::{StorageBackendClaim, StorageBackendContent};
use crate::domain::ports::{split_claim_key, ClaimStatus, CredentialSource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, info, warn};

/// Secret key holding the array password
pub const PASSWORD_KEY: &str = "password";

const FIELD_MANAGER: &str = "storage-backend-manager";

/// Adapter over the Kubernetes API
#[derive(Clone)]
pub struct KubernetesPlatform {
    client: Client,
}

impl KubernetesPlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the claim for a `namespace/name` backend id
    async fn claim(&self, backend_id: &str) -> Result<Option<StorageBackendClaim>> {
        let (namespace, name) = split_claim_key(backend_id);
        let api: Api<StorageBackendClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn bound_content_name(&self, backend_id: &str) -> Result<Option<String>> {
        Ok(self
            .claim(backend_id)
            .await?
            .and_then(|claim| claim.bound_content().map(str::to_string)))
    }
}

#[async_trait]
impl ClaimStatus for KubernetesPlatform {
    async fn is_claim_online(&self, backend_id: &str) -> Result<bool> {
        let Some(content_name) = self.bound_content_name(backend_id).await? else {
            debug!("Claim {} is missing or unbound", backend_id);
            return Ok(false);
        };

        let api: Api<StorageBackendContent> = Api::all(self.client.clone());
        match api.get_opt(&content_name).await? {
            Some(content) => Ok(content.is_online()),
            None => {
                warn!("Content {} bound by claim {} not found", content_name, backend_id);
                Ok(false)
            }
        }
    }

    async fn set_backend_online_status(&self, backend_id: &str, online: bool) -> Result<()> {
        let content_name = self
            .bound_content_name(backend_id)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "StorageBackendContent".to_string(),
                name: backend_id.to_string(),
            })?;

        let api: Api<StorageBackendContent> = Api::all(self.client.clone());
        let patch = json!({ "spec": { "online": online } });
        api.patch(
            &content_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        info!("Set content {} of backend {} online={}", content_name, backend_id, online);
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for KubernetesPlatform {
    async fn password_by_backend_id(&self, backend_id: &str) -> Result<String> {
        let claim = self
            .claim(backend_id)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "StorageBackendClaim".to_string(),
                name: backend_id.to_string(),
            })?;

        let secret_meta = claim.secret_ref().ok_or_else(|| Error::Credential {
            backend_id: backend_id.to_string(),
            reason: "claim references no secret".to_string(),
        })?;

        let (namespace, name) = split_claim_key(secret_meta);
        self.password_by_secret(name, namespace).await
    }

    async fn password_by_secret(&self, name: &str, namespace: &str) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(name).await?.ok_or_else(|| Error::ResourceNotFound {
            kind: "Secret".to_string(),
            name: format!("{}/{}", namespace, name),
        })?;

        password_from_secret(&secret).map_err(|reason| Error::Credential {
            backend_id: format!("{}/{}", namespace, name),
            reason,
        })
    }
}

fn password_from_secret(secret: &Secret) -> std::result::Result<String, String> {
    if let Some(value) = secret.data.as_ref().and_then(|data| data.get(PASSWORD_KEY)) {
        return String::from_utf8(value.0.clone()).map_err(|_| "password is not UTF-8".to_string());
    }

    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(PASSWORD_KEY))
        .cloned()
        .ok_or_else(|| format!("secret has no {} key", PASSWORD_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_password_from_data() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                PASSWORD_KEY.to_string(),
                ByteString(b"s3cret".to_vec()),
            )])),
            ..Default::default()
        };
        assert_eq!(password_from_secret(&secret).unwrap(), "s3cret");
    }

    #[test]
    fn test_password_from_string_data() {
        let secret = Secret {
            string_data: Some(BTreeMap::from([(
                PASSWORD_KEY.to_string(),
                "plain".to_string(),
            )])),
            ..Default::default()
        };
        assert_eq!(password_from_secret(&secret).unwrap(), "plain");
    }

    #[test]
    fn test_password_missing_or_invalid() {
        assert!(password_from_secret(&Secret::default()).is_err());

        let secret = Secret {
            data: Some(BTreeMap::from([(
                PASSWORD_KEY.to_string(),
                ByteString(vec![0xff, 0xfe]),
            )])),
            ..Default::default()
        };
        assert!(password_from_secret(&secret).is_err());
    }
}
