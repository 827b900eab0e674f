//! `lastmile-server`: hosts one LastMile domain service.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use lastmile_server::app;
use lastmile_server::config::ServerArgs;
use lastmile_server::observability::Telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ServerArgs::parse();

    let telemetry = match Telemetry::from_env(args.service.as_str(), &args.log_level, args.log_format) {
        Ok(telemetry) => telemetry,
        Err(err) => {
            eprintln!("failed to initialise logging: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = telemetry.install_global() {
        eprintln!("failed to install logger: {err:#}");
        return ExitCode::FAILURE;
    }

    if let Err(err) = args.validate() {
        error!(error = %err, "configuration rejected");
        return ExitCode::FAILURE;
    }
    info!(config = %args.summary(), "starting");
    if args.otel_endpoint.is_some() {
        warn!("OTLP endpoint configured but no exporter is wired; traces stay in the logs");
    }

    match app::run(&args, telemetry, shutdown_signal()).await {
        Ok(()) => {
            info!("exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = format!("{err:#}"), "exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
