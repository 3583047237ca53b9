//! Storage Array Client
//!
//! Authenticated HTTP access to storage arrays:
//! - Bounded request limiter shared by a client configuration scope
//! - Session client with transparent relogin
//! - Result code coercion for loosely typed responses

pub mod codes;
pub mod limiter;
pub mod session;

pub use limiter::RequestLimiter;
pub use session::{ClientConfig, SessionClient};
