//! Error types for the Storage Backend Manager
//!
//! Provides structured error types for the array session client, the backend
//! registry, capability synchronization and the cluster collaborators.

use crate::client::codes::is_hard_auth_failure;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the backend manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Array Session Errors
    // =========================================================================
    /// The request never reached the array (refused, reset, timed out)
    #[error("Storage {url} unconnected: {reason}")]
    Unconnected { url: String, reason: String },

    /// The array rejected the credentials; the claim has been reported offline
    /// when `code` is one of the hard authentication codes
    #[error("Login {url} failed with error code {code:?}: {response}")]
    Authentication {
        url: String,
        code: Option<i64>,
        response: String,
    },

    #[error("Login {url} succeeded but no session token was returned")]
    MissingToken { url: String },

    #[error("Cannot decode response of {method} {path}: {body}")]
    Decode {
        method: String,
        path: String,
        body: String,
    },

    /// The array answered with a non-zero business result
    #[error("Storage API {operation} failed with code {code}: {message}")]
    Api {
        operation: String,
        code: i64,
        message: String,
    },

    #[error("Credential unavailable for {backend_id}: {reason}")]
    Credential { backend_id: String, reason: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Backend already registered: {name}")]
    BackendAlreadyRegistered { name: String },

    // =========================================================================
    // Capability Synchronization Errors
    // =========================================================================
    #[error("There're pools not available for backend {backend}: requested {requested}, returned {returned}")]
    PoolsUnavailable {
        backend: String,
        requested: usize,
        returned: usize,
    },

    #[error("Capability sync of backend {backend} aborted: {reason}")]
    SyncAborted { backend: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during a sync or reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Unconnected { .. } | Error::Kube(_) => ErrorAction::RequeueWithBackoff,

            // Some pools were not reported; the next cycle usually sees them
            Error::PoolsUnavailable { .. } => ErrorAction::RequeueAfter(Duration::from_secs(30)),

            // Wrong or locked credentials will not fix themselves
            Error::Authentication { code: Some(code), .. } if is_hard_auth_failure(*code) => {
                ErrorAction::NoRequeue
            }

            // Any other rejected login may be the array settling
            Error::Authentication { .. } => ErrorAction::RequeueWithBackoff,

            Error::Credential { .. }
            | Error::Configuration(_)
            | Error::BackendAlreadyRegistered { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unconnected { .. } | Error::Kube(_))
    }
}

/// Result type alias for the backend manager
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::PoolsUnavailable {
            backend: "b1".into(),
            requested: 2,
            returned: 1,
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(30))
        );

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::Authentication {
            url: "https://array".into(),
            code: Some(1077949061),
            response: "{}".into(),
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_soft_authentication_failure_is_retried() {
        let busy = Error::Authentication {
            url: "https://array".into(),
            code: Some(50000001),
            response: "{}".into(),
        };
        assert_eq!(busy.action(), ErrorAction::RequeueWithBackoff);
        assert!(busy.is_retryable());
        assert!(!busy.is_transient());

        let unknown = Error::Authentication {
            url: "https://array".into(),
            code: None,
            response: "<html>".into(),
        };
        assert!(unknown.is_retryable());

        let locked = Error::Authentication {
            url: "https://array".into(),
            code: Some(1077949071),
            response: "{}".into(),
        };
        assert!(!locked.is_retryable());
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::Unconnected {
            url: "https://array".into(),
            reason: "connection refused".into(),
        };
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_transient());
    }
}
