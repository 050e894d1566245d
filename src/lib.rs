//! hashgen - asynchronous password digest service
//!
//! Accepts secrets over HTTP, computes SHA-512 digests in the background
//! (optionally salted), keeps results in a bounded LRU cache written through
//! to an append-only log, and drains in-flight jobs on shutdown.

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod signal;
pub mod stats;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::ExitCode;
use crate::service::HashService;

/// Run hashgen with parsed command-line arguments.
///
/// Returns once the service has been asked to stop, every admitted job has
/// finished, and the HTTP listener has closed.
///
/// # Errors
///
/// Fails if the configuration is invalid, the result log cannot be opened,
/// the listener cannot bind, or the runtime cannot start.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load(&cli).context("Failed to load configuration")?;
    log::debug!("Effective configuration: {:?}", config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(serve_until_drained(config))
}

async fn serve_until_drained(config: Config) -> anyhow::Result<ExitCode> {
    let store_path = config.resolved_store_path();
    let service = Arc::new(HashService::open(&config).with_context(|| {
        format!("Failed to open result store {}", store_path.display())
    })?);
    log::info!(
        "Result store {} ({} record(s)), cache capacity {}",
        store_path.display(),
        service.cache().store().len(),
        service.cache().capacity()
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;

    let driver = service.spawn_shutdown_driver();
    signal::install_handler(Arc::clone(service.controller()))?;

    server::serve(Arc::clone(&service), listener)
        .await
        .context("HTTP server failed")?;

    service.await_terminated().await;
    driver.await.context("Shutdown task failed")?;

    Ok(ExitCode::Success)
}
