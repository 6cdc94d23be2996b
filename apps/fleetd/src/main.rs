//! `fleetd`: registers a framework with the local cluster, turns every line of the work queue
//! into a task, and exits once all of them finished.

mod app;
mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use fleet_core::CoreError;
use fleet_observe::logger_init;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logger_init(&cli.logger_config()) {
        let err = CoreError::Config(e.to_string());
        eprintln!("fleetd: {err}");
        return ExitCode::from(err.exit_code());
    }

    match app::run(cli).await {
        Ok(summary) => {
            info!(
                target: "fleetd",
                total = summary.total,
                launched = summary.launched,
                retried = summary.retried,
                "all tasks finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = app::exit_code(&err);
            error!(target: "fleetd", error = %format!("{err:#}"), exit_code = code, "fleetd failed");
            ExitCode::from(code)
        }
    }
}
