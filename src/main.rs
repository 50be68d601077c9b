use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use meter_consumption_exporter::{
    config::{Cli, ExporterConfig},
    models::run_outcome::RunOutcome,
    os_signals::wait_for_stop_request,
    system::System,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Exit code when the run could not get going or could not write its output.
const FAILURE_EXIT_CODE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(cli.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber. Error: {}", e);
        return ExitCode::from(FAILURE_EXIT_CODE);
    }

    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

async fn run(cli: Cli) -> Result<RunOutcome> {
    let config = ExporterConfig::try_from(cli)?;
    let token = CancellationToken::new();

    let token_clone = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token_clone.cancelled() => {},
            res = wait_for_stop_request() => {
                match res {
                    Ok(_) => {
                        info!("Trying to stop the radio receiver chain...");
                        token_clone.cancel();
                    },
                    Err(e) => {
                        error!("Failed to listen for stop signals. Error: {}", e);
                    }
                };
            },
        }
    });

    info!("Press Ctrl+C to stop.");
    System::new(config, token).run().await
}
