//! flho service and operator CLI entry point.
//!
//! Binary name: `flho`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, wires the
//! services and then either runs the long-lived service (`serve`) or a
//! one-shot operator command.

mod cli;
mod state;

use anyhow::anyhow;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use flho_infra::config::load_service_config;
use flho_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        format: if cli.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        verbosity: cli.verbose,
        otel: cli.otel,
    })
    .map_err(|e| anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_service_config(&cli.config).await;

    // Printing the config needs no database.
    if let Commands::Config = cli.command {
        return cli::print_json(&config);
    }

    let state = AppState::init(config).await?;

    let result = match cli.command {
        Commands::Serve => serve(&state).await,
        Commands::Workflow { action } => cli::workflow::handle(&state, action).await,
        Commands::Run { action } => cli::run::handle(&state, action).await,
        Commands::Identity { action } => cli::identity::handle(&state, action).await,
        Commands::Config => Ok(()),
    };

    state.shutdown().await;
    result
}

/// Consume partner events and fire retry countdowns until a shutdown signal.
async fn serve(state: &AppState) -> anyhow::Result<()> {
    let deliveries = state.broker.consume(&state.topology.queue).await?;
    let cancel = CancellationToken::new();
    let consumer = tokio::spawn(state.dispatcher().run(deliveries, cancel.clone()));

    if state.config.orchestrator.recover_on_startup {
        state.orchestrator.recover_stalled_runs().await?;
    }

    let sweeper = state
        .config
        .orchestrator
        .sweep_interval()
        .map(|interval| tokio::spawn(state.orchestrator.clone().sweep(interval, cancel.clone())));

    tracing::info!(
        service = %state.config.service.name,
        exchange = %state.topology.exchange,
        queue = %state.topology.queue,
        partners = state.topology.partners.len(),
        "service started"
    );

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    state.orchestrator.countdowns().shutdown().await;
    cancel.cancel();
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "event consumer task failed");
    }
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "run sweep task failed");
        }
    }

    tracing::info!("service stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
