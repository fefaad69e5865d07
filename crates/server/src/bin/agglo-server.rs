//! agglo-server — ZeroMQ solver server for interactive agglomeration.
//!
//! Serves the six solver channels for one paintera label dataset. Runs until
//! SIGINT or SIGTERM, then shuts the channels and the workflow down cleanly.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use agglo_compute::RandomForestConfig;
use agglo_server::SolverServer;
use agglo_store::N5Container;

/// Interactive agglomeration solver server.
#[derive(Parser, Debug)]
#[command(name = "agglo-server", version, about)]
struct Cli {
    /// Path to the N5 container root.
    #[arg(long, env = "AGGLO_CONTAINER")]
    container: String,

    /// Paintera label dataset inside the container.
    #[arg(long, env = "AGGLO_PAINTERA_DATASET")]
    paintera_dataset: String,

    /// Base address; channel addresses are derived by suffixing it.
    #[arg(long, env = "AGGLO_ADDRESS_BASE", default_value = "ipc:///tmp/agglo/solver")]
    address_base: String,

    /// Tokio worker threads for the socket loops.
    #[arg(long, env = "AGGLO_IO_THREADS", default_value_t = 1)]
    io_threads: usize,

    /// Number of trees in the random forest.
    #[arg(long, env = "AGGLO_N_ESTIMATORS", default_value_t = 100)]
    n_estimators: usize,

    /// Log level filter when RUST_LOG is unset.
    #[arg(long, env = "AGGLO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.io_threads.max(1))
        .enable_all()
        .build()
        .context("failed to build the tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let container = N5Container::open(&cli.container)
        .with_context(|| format!("failed to open container {}", cli.container))?;

    let config = RandomForestConfig {
        n_estimators: cli.n_estimators,
        ..RandomForestConfig::default()
    };

    let server = SolverServer::serve(
        container,
        &cli.paintera_dataset,
        &cli.address_base,
        config,
    )
    .await
    .context("failed to start the solver server")?;

    info!(
        container = %cli.container,
        dataset = %cli.paintera_dataset,
        "agglo-server started"
    );

    wait_for_signal().await?;
    info!("shutdown signal received");
    server.shutdown().await;
    info!("agglo-server exited cleanly");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install the SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to wait for SIGINT")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
