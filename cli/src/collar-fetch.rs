//! # collar-fetch
//!
//! Fetches telemetry from one source (Vectronics API, ATS portal or CSV
//! files), merges it into one table and writes it to stdout. Failed items
//! are logged as warnings; the exit code is non-zero only when every item
//! failed.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use lib_collar::loggers::{LogOptions, setup_logging};
use lib_collar::{FailureReport, default_rename, fetch_normalized, keep_names};
use tracing::{error, info, warn};

mod collar_logic;
use collar_logic::args::Cli;
use collar_logic::{config, output, request};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _guard = setup_logging(&LogOptions {
        level: cli.global.log_level.clone().unwrap_or_else(|| "info".to_string()),
        log_dir: cli.global.log_dir.clone(),
        ..LogOptions::default()
    })?;

    let config = config::load_config(&cli.global)?;
    let format = cli.global.format;
    let keep = cli.global.keep_names;
    let request = request::build_request(cli.command)?;
    info!(source = %request.kind(), "collar-fetch starting");

    let outcome = if keep {
        fetch_normalized(&request, &config, keep_names).await
    } else {
        fetch_normalized(&request, &config, default_rename).await
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Fetch failed");
            return Err(e.into());
        }
    };

    for failure in &outcome.failed {
        let report = FailureReport::from(failure);
        warn!(item = report.item, kind = report.kind, error = %report.message, "Item failed");
    }

    output::write_table(&outcome.table, format, std::io::stdout().lock())?;
    info!(
        rows = outcome.table.len(),
        tables = outcome.table.provenance().len(),
        failed = outcome.failed.len(),
        "collar-fetch finished"
    );

    if outcome.all_failed() {
        error!("Every item failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
