//! Storage Backend Manager
//!
//! Registers the configured storage arrays, keeps their capabilities in sync
//! and serves their status.
//!
//! # Lifecycle
//!
//! ```text
//!   load config ──► log in to every backend ──► strict sync (with backoff)
//!                                                     │
//!        ┌────────────────────────────────────────────┘
//!        ▼
//!   periodic async sync ◄──► REST status API
//!        │
//!   Ctrl-C ──► stop loop and server ──► log out of every backend
//! ```

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_backend_manager::{
    claim_key, ApiServer, ApiServerConfig, BackendFactory, BackendRegistry,
    CapabilitySynchronizer, DriverConfig, Error, PlatformFactory, PlatformHandles, Result,
    StandalonePlatform, SyncConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Backend Manager - array sessions and capability synchronization
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration file listing the backends
    #[arg(long, env = "DRIVER_CONFIG", default_value = "/etc/storage-backend-manager/backends.yaml")]
    config: String,

    /// Namespace holding backend claims and secrets (overrides the config file)
    #[arg(long, env = "NAMESPACE")]
    namespace: Option<String>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Capability sync interval in seconds (overrides the config file)
    #[arg(long, env = "SYNC_INTERVAL")]
    sync_interval_secs: Option<u64>,

    /// Give up on the startup sync after this many seconds
    #[arg(long, env = "STARTUP_TIMEOUT", default_value = "300")]
    startup_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run in standalone mode (no Kubernetes, passwords from the config file)
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Storage Backend Manager");
    info!("  Version: {}", storage_backend_manager::VERSION);
    info!("  Config: {}", args.config);
    info!("  REST API: {}", args.api_addr);
    info!("  Standalone mode: {}", args.standalone);

    let mut config = DriverConfig::load(&args.config)?;
    if let Some(namespace) = &args.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(interval) = args.sync_interval_secs {
        config.sync_interval_secs = interval;
    }
    config.validate()?;

    let platform = build_platform(&args, &config).await?;

    // Register backends
    let registry = BackendRegistry::new();
    let registered = BackendFactory::register_all(&config, &registry, &platform).await;
    if registered == 0 && !config.backends.is_empty() {
        warn!("No configured backend could be registered");
    }

    let shutdown = CancellationToken::new();
    spawn_event_logger(&registry, shutdown.clone());

    let synchronizer = CapabilitySynchronizer::new(
        SyncConfig {
            namespace: config.namespace.clone(),
            interval: config.sync_interval(),
            startup_timeout: Duration::from_secs(args.startup_timeout_secs),
        },
        registry.clone(),
        platform.claims.clone(),
    );

    synchronizer.initial_sync().await.map_err(|e| {
        error!("Startup capability sync failed: {}", e);
        e
    })?;
    info!("Startup capability sync complete");

    // Periodic sync
    let sync_handle = {
        let synchronizer = synchronizer.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { synchronizer.run(shutdown).await })
    };

    // API server
    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
    };
    let api_server = ApiServer::new(api_config, registry.clone(), synchronizer);
    let api_handle = tokio::spawn(api_server.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("Failed to listen for shutdown signal: {}", e)))?;
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = sync_handle.await {
        error!("Sync loop task failed: {}", e);
    }
    match api_handle.await {
        Ok(Err(e)) => error!("API server error: {}", e),
        Err(e) => error!("API server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    registry.logout_all().await;

    info!("Backend manager shutdown complete");
    Ok(())
}

/// Claim status and credential collaborators for the selected mode
async fn build_platform(args: &Args, config: &DriverConfig) -> Result<PlatformHandles> {
    if !args.standalone {
        let client = kube::Client::try_default().await?;
        return Ok(PlatformFactory::kubernetes(client));
    }

    let platform = Arc::new(StandalonePlatform::new());
    for entry in &config.backends {
        let Some(password) = &entry.password else {
            warn!("Backend {} has no inline password", entry.name);
            continue;
        };
        platform.set_password(&claim_key(&config.namespace, &entry.name), password);
        if !entry.secret_name.is_empty() {
            let namespace = entry.secret_namespace.as_deref().unwrap_or(&config.namespace);
            platform.set_secret(namespace, &entry.secret_name, password);
        }
    }

    Ok(PlatformFactory::standalone(platform))
}

/// Log registry lifecycle events until shutdown
fn spawn_event_logger(registry: &BackendRegistry, shutdown: CancellationToken) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                event = events.recv() => match event {
                    Ok(event) => info!(backend = event.backend(), "Registry event: {}", event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Registry event logger skipped {} events", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    });
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "kube=info", "tower=warn", "tower_http=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
