//! Registry Events
//!
//! Events emitted by the backend registry for external consumers to react to
//! backend lifecycle changes.

use serde::{Deserialize, Serialize};

/// Events emitted by the backend registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A backend was registered
    BackendRegistered { name: String, pool_count: u32 },

    /// A backend was removed, usually because its claim went offline
    BackendRemoved { name: String },

    /// A backend's availability flipped after a sync
    AvailabilityChanged { name: String, available: bool },
}

impl RegistryEvent {
    /// Name of the backend the event concerns
    pub fn backend(&self) -> &str {
        match self {
            RegistryEvent::BackendRegistered { name, .. }
            | RegistryEvent::BackendRemoved { name }
            | RegistryEvent::AvailabilityChanged { name, .. } => name,
        }
    }
}

impl std::fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEvent::BackendRegistered { name, pool_count } => {
                write!(f, "backend {} registered with {} pools", name, pool_count)
            }
            RegistryEvent::BackendRemoved { name } => write!(f, "backend {} removed", name),
            RegistryEvent::AvailabilityChanged { name, available } => {
                write!(f, "backend {} available={}", name, available)
            }
        }
    }
}
