//! Domain layer
//!
//! Ports between the synchronizer and the outside world: vendor plugins,
//! claim status and credential sources.

pub mod ports;

pub use ports::*;
