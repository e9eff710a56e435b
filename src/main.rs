//! chatrelay HTTP server
//!
//! Starts an Axum web server that relays chat messages to hosted AI providers.

use chatrelay::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    error::StoreError,
    handlers::{self, AppState},
    models::PriorityStore,
    telemetry,
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Config { output } => write_template(output.as_deref()),
        Command::InitPriorities { force } => init_priorities(&cli.config, force).await,
        Command::Serve => serve(&cli.config).await,
    }
}

fn write_template(output: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            std::fs::write(path, generate_config_template())?;
            eprintln!("Configuration template written to {}", path);
        }
        None => print!("{}", generate_config_template()),
    }
    Ok(())
}

async fn init_priorities(config_path: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(config_path)?;
    telemetry::init(&config.observability.log_level);

    let store =
        PriorityStore::create_default(&config.priority_store.path, &config.providers, force)
            .await?;
    eprintln!(
        "Priority store written to {} ({} providers)",
        store.path().display(),
        store.entries().await.len()
    );
    Ok(())
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(Config::from_file(config_path)?);

    telemetry::init(&config.observability.log_level);

    let store = match PriorityStore::load(&config.priority_store.path).await {
        Ok(store) => store,
        Err(e @ StoreError::Read { .. }) => {
            tracing::error!(
                error = %e,
                "Priority store not readable. Create it with: chatrelay init-priorities --config {}",
                config_path
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let state = AppState::new(config.clone(), Arc::new(store))?;

    for descriptor in &config.providers {
        let result = state.gate().check(descriptor);
        tracing::info!(
            provider_id = %result.provider_id,
            available = result.available,
            "Provider credential check"
        );
    }

    let app = handlers::app(state);

    let listener = handlers::bind(&config.server).await.map_err(|e| {
        tracing::error!(
            host = %config.server.host,
            port = config.server.port,
            error = %e,
            "Failed to bind server address"
        );
        e
    })?;
    tracing::info!("Starting chatrelay server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining in-flight requests");
}
