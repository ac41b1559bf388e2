use std::{path::PathBuf, process::ExitCode};

use chrono::Utc;
use clap::Parser;
use offboard::{
    AppState,
    config::Config,
    deletion::start_deletion_worker,
    observability::init_tracing,
    routes::build_app,
};
use tracing::{error, info};

/// CLI arguments for the offboarding worker.
#[derive(Parser, Debug)]
#[command(version, about = "Account offboarding worker", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML config file. Without one, built-in defaults apply
    /// (in-memory backends, admin endpoints locked).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the admin API server (default). Also runs the interval worker
    /// when [deletion].enabled is set.
    Serve,
    /// Run one deletion batch pass and exit. For external schedulers (cron).
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.observability);

    match args.command.unwrap_or(Command::Serve) {
        Command::Run => run_once(config).await,
        Command::Serve => serve(config).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, offboard::config::ConfigError> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

/// Single batch pass for cron-driven deployments. Exits nonzero on a fatal
/// run error so the scheduler can alert.
async fn run_once(config: Config) -> ExitCode {
    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    match state.processor.run_batch(Utc::now()).await {
        Ok(summary) => {
            info!(
                processed = summary.processed_count,
                succeeded = summary.succeeded(),
                failed = summary.failed(),
                "Deletion run finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Deletion run failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> ExitCode {
    let bind_addr = config.server.bind_addr();
    let deletion = config.deletion.clone();

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            return ExitCode::FAILURE;
        }
    };

    let worker = if deletion.enabled {
        Some(start_deletion_worker(
            state.processor.clone(),
            deletion.interval(),
        ))
    } else {
        info!("Interval worker disabled; trigger runs via the `run` subcommand");
        None
    };

    let app = build_app(state);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %bind_addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(address = %bind_addr, "Server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(worker) = worker {
        worker.abort();
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    info!("Shutdown signal received");
}
