//! sheet-query - Main entry point.
//!
//! Serves the upload form (default) or runs one query from files on disk.

use clap::Parser;
use sheet_query::config::{Config, RunMode};
use sheet_query::db::{ClientInit, init_oracle_client};
use sheet_query::service::QueryService;
use sheet_query::transport::{BatchTransport, HttpTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env must be loaded before clap reads env fallbacks
    let dotenv = dotenvy::dotenv();

    let config = Config::parse();
    init_tracing(&config);

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to load .env file"),
    }

    info!(mode = %config.mode, "Starting sheet-query v{}", env!("CARGO_PKG_VERSION"));

    let registry = config.build_registry(|key| std::env::var(key).ok())?;
    let names = registry.names().await;
    info!(count = names.len(), databases = ?names, "Databases configured");

    if registry.has_oracle().await {
        let lib_dir = config.oracle_client_lib_dir.clone();
        let init = tokio::task::spawn_blocking(move || init_oracle_client(lib_dir.as_deref())).await?;
        match init {
            Ok(ClientInit::Initialized | ClientInit::AlreadyInitialized) => {}
            // Non-Oracle databases stay usable; Oracle sessions retry and report the error.
            Err(e) => warn!(error = %e, "Oracle client initialization failed"),
        }
    }

    let service = Arc::new(QueryService::new(
        registry,
        config.executor()?,
        config.placeholder.clone(),
    ));

    let result = match config.mode {
        RunMode::Serve => {
            info!(host = %config.http_host, port = config.http_port, "Using HTTP transport");
            let transport = HttpTransport::new(service, &config.http_host, config.http_port);
            transport.run().await
        }
        RunMode::Run => {
            let (Some(select), Some(input), Some(query_file)) =
                (&config.select, &config.input, &config.query_file)
            else {
                eprintln!("Error: run mode needs --select, --input and --query-file.");
                eprintln!();
                eprintln!("Example:");
                eprintln!(
                    "  sheet-query --mode run --select GRA_Database --input services.xlsx --query-file query.sql"
                );
                std::process::exit(2);
            };
            let transport =
                BatchTransport::new(service, select, input, query_file, &config.output);
            info!(transport = transport.name(), output = %transport.output().display(), "Running batch query");
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, code = e.code(), "sheet-query failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("{}\n{}", e, suggestion);
        }
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
