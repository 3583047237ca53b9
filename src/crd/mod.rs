//! Custom Resource Definitions consumed by the backend manager
//!
//! - StorageBackendClaim: namespaced registration request for an array
//! - StorageBackendContent: cluster-scoped bound backend record

pub mod storage_backend_claim;
pub mod storage_backend_content;

pub use storage_backend_claim::*;
pub use storage_backend_content::*;
