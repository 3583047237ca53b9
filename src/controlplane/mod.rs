//! Control Plane Module
//!
//! Keeps the registered backends' capabilities current and exposes their
//! status.

pub mod api;
pub mod backends;
pub mod platform;
pub mod sync;

pub use api::*;
pub use backends::*;
pub use platform::*;
pub use sync::*;
