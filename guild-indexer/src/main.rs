//! Guild Indexer Main Entry Point
//!
//! Runs the guild ingest (change source, enrichment, delivery into OpenSearch) and the HTTP
//! query server side by side in one process.

use dotenv::dotenv;
use guild_indexer::server::{create_app, run_server};
use guild_indexer::{Dependencies, IndexerSettings, IndexingError};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("guild_indexer=info,guild_indexer_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;

        info!(
            service_name = "guild-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;

        info!(
            service_name = "guild-indexer",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!("Starting Guild Indexer");

    let settings = match IndexerSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    let Dependencies {
        mut orchestrator,
        app_state,
    } = match Dependencies::new(&settings).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let shutdown = orchestrator.shutdown_handle();

    let server = tokio::spawn(run_server(
        create_app(app_state),
        settings.query_server_addr,
        shutdown.subscribe(),
    ));

    let signal_handle = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal_handle.shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let result = orchestrator.run().await;

    // Stop the server whether the ingest stopped cleanly or not.
    shutdown.shutdown();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Query server failed"),
        Err(e) => error!(error = %e, "Query server task panicked"),
    }

    match result {
        Ok(stats) => {
            info!(
                documents_delivered = stats.documents_delivered,
                documents_dead_lettered = stats.documents_dead_lettered,
                "Guild indexer stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Guild indexer failed");
            Err(e.into())
        }
    }
}
