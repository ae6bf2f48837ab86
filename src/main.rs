//! `db-router` service binary.
//!
//! Hosts a [`Router`] over PostgreSQL pools next to the admin/metrics HTTP
//! surface, until SIGINT or SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use db_router::admin::{setup_admin_router, AdminState};
use db_router::config::loader::load_config;
use db_router::lifecycle::signals;
use db_router::observability::logging::init_logging;
use db_router::pool::postgres::PgPoolFactory;
use db_router::{Router, ServiceConfig};

#[derive(Parser)]
#[command(name = "db-router")]
#[command(about = "Primary/replica query router with health checks and circuit breaking", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "db-router starting");
    if cli.config.is_none() {
        tracing::warn!("No --config given, using defaults");
    }

    let router = Arc::new(Router::new(config.router.clone(), &PgPoolFactory)?);
    router.start().await?;

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin server listening");

        let app = setup_admin_router(AdminState::new(router.clone(), config.admin.api_key.clone()));
        axum::serve(listener, app)
            .with_graceful_shutdown(signals::terminate())
            .await?;
        tracing::info!("Admin server stopped");
    } else {
        signals::terminate().await;
    }

    router.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
