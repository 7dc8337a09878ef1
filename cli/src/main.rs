//! Stratus CLI - deploy and manage applications on a cloud application platform

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use stratus_cli::cli::Cli;
use stratus_cli::domain::DeployError;
use stratus_cli::output::json::format_error;

/// Exit status used when the user interrupts a command.
const EXIT_CANCELED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable under --json.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STRATUS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, canceling");
            on_signal.cancel();
        }
    });

    match cli.run(cancel).await {
        Ok(code) => code,
        Err(e) => {
            let canceled = e
                .downcast_ref::<DeployError>()
                .is_some_and(DeployError::is_canceled);
            if canceled {
                eprintln!("Operation canceled.");
                return ExitCode::from(EXIT_CANCELED);
            }
            if json {
                match format_error(&format!("{e:#}"), error_code(&e)) {
                    Ok(doc) => println!("{doc}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn error_code(e: &anyhow::Error) -> &'static str {
    match e.downcast_ref::<DeployError>() {
        Some(DeployError::Validation(_)) => "VALIDATION",
        Some(DeployError::NotFound(_)) => "NOT_FOUND",
        Some(DeployError::Auth(_)) => "AUTH",
        Some(DeployError::Remote { .. }) => "REMOTE",
        Some(DeployError::Timeout { .. }) => "TIMEOUT",
        Some(DeployError::Canceled) => "CANCELED",
        Some(DeployError::Archive(_)) => "ARCHIVE",
        None => "ERROR",
    }
}
