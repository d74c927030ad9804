//! Service entry point.
//!
//! `run_service` binds the HTTP port and runs until Ctrl+C or SIGTERM.
//! `serve_with` does the same on a caller-supplied listener and token, which
//! lets tests run the whole service on an ephemeral port.

mod init;
mod resources;

use anyhow::{Context, Result};
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::app::{shutdown_gracefully, wait_for_shutdown_signal};
use crate::config::Config;
use crate::server;

pub use init::init_service_resources;
pub use resources::ServiceResources;

/// Runs the service with the provided configuration.
///
/// This is the main entry point for the library. It initializes the store,
/// starts the monthly refresh scheduler and serves the HTTP API on
/// `0.0.0.0:<http_port>` until a shutdown signal arrives.
///
/// # Errors
///
/// This function will return an error if:
/// - The configuration is invalid
/// - Database initialization or migration fails
/// - The HTTP port cannot be bound
///
/// # Example
///
/// ```no_run
/// use ip_info::{run_service, Config};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config {
///     http_port: 9000,
///     ..Default::default()
/// };
/// run_service(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_service(config: Config) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", config.http_port))?;

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(wait_for_shutdown_signal(cancel.clone()));

    let result = serve_with(config, listener, cancel.clone()).await;

    cancel.cancel();
    let _ = signal_task.await;
    result
}

/// Runs the service on `listener` until `cancel` fires.
///
/// # Errors
///
/// Returns an error if initialization fails or the server stops abnormally.
pub async fn serve_with(
    config: Config,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<()> {
    let resources = init_service_resources(&config, &cancel).await?;
    let ServiceResources {
        pool,
        state,
        scheduler,
        janitors,
    } = resources;

    let result = server::serve(listener, server::router(state), cancel.clone()).await;

    shutdown_gracefully(cancel, scheduler, janitors).await;
    pool.close().await;
    info!("Service stopped");

    result
}
