//! Backend Registry
//!
//! In-memory registry of storage backends and their pools, with a
//! broadcast channel announcing lifecycle changes.

pub mod backend_registry;
pub mod events;

pub use backend_registry::*;
pub use events::*;
