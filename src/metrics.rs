//! Prometheus metrics
//!
//! Process-wide counters registered in the default Prometheus registry and
//! exposed by the API server on `/metrics`.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};
use std::sync::OnceLock;

/// Backend manager metrics
pub struct Metrics {
    /// Session relogins performed against arrays
    pub relogins: IntCounter,
    /// Per-backend sync outcomes, labelled by mode and outcome
    pub sync_results: IntCounterVec,
    /// Backends currently marked available
    pub backends_available: IntGauge,
    /// Backends currently registered
    pub backends_registered: IntGauge,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Process-wide metrics, registered on first use
pub fn global() -> &'static Metrics {
    METRICS.get_or_init(Metrics::register)
}

impl Metrics {
    fn register() -> Self {
        let metrics = Self {
            relogins: IntCounter::new(
                "backend_manager_relogins_total",
                "Number of array session relogins",
            )
            .expect("valid metric definition"),
            sync_results: IntCounterVec::new(
                Opts::new(
                    "backend_manager_sync_results_total",
                    "Backend capability sync outcomes",
                ),
                &["mode", "outcome"],
            )
            .expect("valid metric definition"),
            backends_available: IntGauge::new(
                "backend_manager_backends_available",
                "Number of backends marked available",
            )
            .expect("valid metric definition"),
            backends_registered: IntGauge::new(
                "backend_manager_backends_registered",
                "Number of registered backends",
            )
            .expect("valid metric definition"),
        };

        let registry = prometheus::default_registry();
        let _ = registry.register(Box::new(metrics.relogins.clone()));
        let _ = registry.register(Box::new(metrics.sync_results.clone()));
        let _ = registry.register(Box::new(metrics.backends_available.clone()));
        let _ = registry.register(Box::new(metrics.backends_registered.clone()));

        metrics
    }

    /// Record the outcome of one backend's sync
    pub fn record_sync(&self, mode: &str, outcome: &str) {
        self.sync_results.with_label_values(&[mode, outcome]).inc();
    }
}

/// Encode the default registry in the Prometheus text format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Metrics encode error: {}", e)))?;

    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics encode error: {}", e)))
}
