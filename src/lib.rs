//! Storage Backend Manager
//!
//! Backend-management layer of a CSI storage driver: a registry of storage
//! arrays and their pools, resilient authenticated sessions to each array,
//! and a synchronizer that keeps pool capabilities and capacity current.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                               Sync Drivers                                   │
//! │     sync_all (strict, sequential)        sync_all_async (task per backend)   │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                         Capability Synchronizer                              │
//! │   claim online? ──► backend caps ──► pool caps ──► merge into registry       │
//! ├───────────────────────────────────┬─────────────────────────────────────────┤
//! │         Backend Registry          │           Backend Plugins                │
//! │   backends, pools, availability   │   FusionStorage (SAN / NAS)              │
//! │   lifecycle events                │                                          │
//! ├───────────────────────────────────┴─────────────────────────────────────────┤
//! │                            Session Client                                    │
//! │   login / relogin / logout, retry on session expiry, request limiter         │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                           Platform Adapters                                  │
//! │   Kubernetes (claims, contents, secrets)        Standalone (in-memory)       │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: Array session client and request limiter
//! - [`registry`]: Backend registry and events
//! - [`controlplane`]: Synchronizer, plugins, platform adapters and status API
//! - [`crd`]: Custom Resource Definitions
//! - [`config`]: Driver configuration
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod client;
pub mod config;
pub mod controlplane;
pub mod crd;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod registry;

// Re-export commonly used types
pub use client::{ClientConfig, RequestLimiter, SessionClient};

pub use config::{BackendEntry, DriverConfig};

pub use controlplane::{
    ApiServer, ApiServerConfig, BackendFactory, CapabilitySynchronizer, FusionStoragePlugin,
    KubernetesPlatform, PlatformFactory, PlatformHandles, StandalonePlatform, SyncConfig,
    SyncOutcome, SyncReport,
};

pub use crd::{StorageBackendClaim, StorageBackendContent};

pub use domain::ports::{
    claim_key, BackendPlugin, CapabilityMap, ClaimStatus, CredentialSource, PoolCapabilities,
    StorageKind, FREE_CAPACITY,
};

pub use error::{Error, ErrorAction, Result};

pub use registry::{Backend, BackendRegistry, Pool, RegistryEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
