//! Driver Configuration
//!
//! YAML description of the backends the manager registers at startup.
//!
//! ```yaml
//! namespace: huawei-csi
//! syncIntervalSecs: 60
//! backends:
//!   - name: fusion-a
//!     storage: fusionstorage-san
//!     url: https://10.0.0.10:28443
//!     user: admin
//!     secretName: fusion-a-secret
//!     parallelNum: 50
//!     pools: [pool-1, pool-2]
//! ```

use crate::client::ClientConfig;
use crate::domain::ports::{claim_key, StorageKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

fn default_namespace() -> String {
    "huawei-csi".to_string()
}

fn default_sync_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

/// Top-level driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    /// Namespace holding backend claims and secrets
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            sync_interval_secs: default_sync_interval(),
            backends: Vec::new(),
        }
    }
}

/// One storage array registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendEntry {
    pub name: String,
    pub storage: StorageKind,
    pub url: String,
    pub user: String,

    /// Secret holding the password; namespace defaults to the driver's
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub secret_namespace: Option<String>,

    /// Parallel request count, number or string
    #[serde(default)]
    pub parallel_num: Option<Value>,

    #[serde(default)]
    pub account_name: String,

    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,

    pub pools: Vec<String>,

    /// Inline password, standalone mode only
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl BackendEntry {
    /// Raw parallel request setting as the limiter reads it
    pub fn parallel_setting(&self) -> Option<String> {
        match &self.parallel_num {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Session client identity for this backend
    pub fn client_config(&self, namespace: &str) -> ClientConfig {
        ClientConfig {
            url: self.url.trim_end_matches('/').to_string(),
            user: self.user.clone(),
            secret_name: self.secret_name.clone(),
            secret_namespace: self
                .secret_namespace
                .clone()
                .unwrap_or_else(|| namespace.to_string()),
            backend_id: claim_key(namespace, &self.name),
            account_name: self.account_name.clone(),
            insecure_skip_verify: self.insecure_skip_verify,
        }
    }
}

impl DriverConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: DriverConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Configuration("namespace must not be empty".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(Error::Configuration("syncIntervalSecs must be positive".into()));
        }

        let mut names = BTreeSet::new();
        for entry in &self.backends {
            if entry.name.is_empty() || entry.name.contains('/') {
                return Err(Error::Configuration(format!(
                    "invalid backend name {:?}",
                    entry.name
                )));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "backend {} is configured twice",
                    entry.name
                )));
            }
            if !entry.url.starts_with("http://") && !entry.url.starts_with("https://") {
                return Err(Error::Configuration(format!(
                    "backend {} url must be http(s), got {:?}",
                    entry.name, entry.url
                )));
            }
            if entry.pools.is_empty() {
                return Err(Error::Configuration(format!(
                    "backend {} lists no pools",
                    entry.name
                )));
            }
        }

        Ok(())
    }
}
