//! Bounded Request Limiter
//!
//! Counting semaphore capping the number of simultaneous outbound calls a
//! client configuration scope may have in flight against an array.

use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

/// Permits handed out when no parallel count is configured
pub const DEFAULT_PARALLEL_COUNT: usize = 50;
/// Upper bound of the configurable parallel count
pub const MAX_PARALLEL_COUNT: usize = 1000;
/// Lower bound of the configurable parallel count
pub const MIN_PARALLEL_COUNT: usize = 20;

/// Counting semaphore for outbound array requests
#[derive(Debug)]
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl RequestLimiter {
    /// Create a limiter with `n` permits, clamped to the supported range
    pub fn new(n: usize) -> Self {
        let capacity = n.clamp(MIN_PARALLEL_COUNT, MAX_PARALLEL_COUNT);
        if capacity != n {
            warn!(
                "The config parallelNum {} is out of range [{}, {}], clamped to {}",
                n, MIN_PARALLEL_COUNT, MAX_PARALLEL_COUNT, capacity
            );
        }

        info!("Init parallel count is {}", capacity);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Create a limiter from the raw configured value.
    ///
    /// An absent or unparsable value falls back to [`DEFAULT_PARALLEL_COUNT`].
    pub fn from_config(parallel_num: Option<&str>) -> Self {
        match parallel_num.map(str::trim).filter(|s| !s.is_empty()) {
            None => Self::new(DEFAULT_PARALLEL_COUNT),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) => Self::new(n),
                Err(_) => {
                    warn!(
                        "The config parallelNum {} is invalid, set it to the default value {}",
                        raw, DEFAULT_PARALLEL_COUNT
                    );
                    Self::new(DEFAULT_PARALLEL_COUNT)
                }
            },
        }
    }

    /// Wait for a permit. The permit is returned when the guard drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("request limiter closed".into()))
    }

    /// Total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_COUNT)
    }
}
