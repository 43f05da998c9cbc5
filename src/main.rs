//! primflow - state-graph workflow engine
//!
//! Serves the state editing API and runs workflows over the stored graph.

use primflow_core::IssueSeverity;
use primflow_server::metrics::run_metrics_server;
use primflow_server::{ApiHandler, Config, Metrics, Server, ServerConfig};
use primflow_storage::GraphStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Defaults, then PRIMFLOW_CONFIG, then env overrides
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("PRIMFLOW_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            if std::env::var("PRIMFLOW_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting primflow server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());
    match config.engine.step_budget() {
        Some(max) => tracing::info!("  Step budget: {}", max),
        None => tracing::info!("  Step budget: unbounded"),
    }
    if !config.engine.halt_states.is_empty() {
        tracing::info!("  Halt states: {}", config.engine.halt_states.join(", "));
    }

    let store = Arc::new(GraphStore::open(config.storage.graph_dir())?);
    let registry = Arc::new(primflow_primitives::default_registry());
    tracing::info!("  Primitives: {}", registry.names().join(", "));

    // Surface problems in the stored graph early; runs re-check before starting.
    match store.catalog() {
        Ok(catalog) => {
            for issue in catalog.validate(&registry) {
                match issue.severity {
                    IssueSeverity::Error => {
                        tracing::error!("Stored state {}: {}", issue.state, issue.message)
                    }
                    IssueSeverity::Warning => {
                        tracing::warn!("Stored state {}: {}", issue.state, issue.message)
                    }
                }
            }
        }
        Err(e) => tracing::error!("Stored graph does not form a catalog: {}", e),
    }

    let metrics = Arc::new(Metrics::new()?);
    let handler = ApiHandler::new(store, registry)
        .with_engine_config(config.engine.clone())
        .with_metrics(metrics.clone());

    let server_config = ServerConfig::new(config.network.bind_addr)
        .with_max_body_bytes(config.network.max_body_bytes);
    let server = Arc::new(Server::new(server_config, handler));

    let metrics_handle = if config.metrics.enabled {
        let shutdown = server.subscribe_shutdown();
        let addr = config.metrics.bind_addr;
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  Standalone metrics listener: disabled");
        None
    };

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
