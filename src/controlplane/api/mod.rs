//! API Module
//!
//! REST status API: health, readiness, metrics, backend inspection and an
//! on-demand capability sync.

pub mod server;
pub mod rest;

pub use server::*;
pub use rest::*;
