use std::{future::Future, process::ExitCode};

use clap::Parser;
use loglet::{cli::Cli, Pipeline, PipelineError};
use tokio::{runtime::Runtime, signal};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(&cli));
    shutdown(runtime);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "loglet failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), PipelineError> {
    let config = cli.resolve_config()?;
    let pipeline = Pipeline::from_config(&config)?;
    pipeline.run(shutdown_signal()).await
}

/// Every stage has joined by now. A stdin read can still be parked on a blocking-pool thread
/// until the writer sends more data, so the runtime is not allowed to wait for it.
fn shutdown(runtime: Runtime) {
    runtime.shutdown_background();
}

/// Logs go to stderr; stdout may be carrying messages for the stdout sink.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Resolves on SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns, so a signal arriving while the
/// pipeline starts up is not lost.
fn shutdown_signal() -> impl Future<Output = ()> + Send {
    #[cfg(unix)]
    let sigterm = signal::unix::signal(signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match sigterm {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to listen for SIGTERM");
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
}
