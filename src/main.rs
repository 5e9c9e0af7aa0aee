//! rstdt - compact binary search server
//!
//! Serves price-range searches over TCP with one-byte headers and 9-bit packed entries.

use rstdt_server::{Config, InMemoryCatalog, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if RSTDT_CONFIG is set, then env overrides)
    let config_path = std::env::var("RSTDT_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }

    tracing::info!("Starting rstdt server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  Timeouts: idle={}s read={}s write={}s",
        config.network.idle_timeout_secs,
        config.network.read_timeout_secs,
        config.network.write_timeout_secs
    );
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Quantize policy: {:?}", config.catalog.quantize_policy);

    let catalog = match &config.catalog.path {
        Some(path) => {
            let catalog = InMemoryCatalog::from_file(path)?;
            tracing::info!("  Catalog: {}", path.display());
            catalog
        }
        None => {
            tracing::info!("  Catalog: built-in sample");
            InMemoryCatalog::sample()
        }
    };
    tracing::info!(
        "  Resources: {} ({} record(s))",
        catalog.len(),
        catalog.record_count()
    );

    // Fail before serving if strict packing would reject a record on every search
    let policy = config.catalog.quantize_policy;
    if let Err(e) = catalog.validate_policy(policy) {
        tracing::error!("Catalog does not pack under {:?} quantization: {}", policy, e);
        return Err(e.into());
    }
    for (resource, record) in catalog.lossy_records() {
        tracing::warn!(
            "Record {} in {} is served as {:?}",
            record.id,
            resource,
            record.quantized()
        );
    }

    let server = Arc::new(Server::new(
        ServerConfig::from_config(&config),
        Arc::new(catalog),
    ));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
