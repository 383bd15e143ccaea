//! ## netautotest-cli
//! **Command-line front end for performance test campaigns**
//!
//! Exit status: `0` campaign passed, `1` campaign completed with a failing
//! verdict, `2` aborted or invalid configuration.

use std::process::ExitCode;

use clap::Parser;

mod commands;
mod outcome;

use commands::Cli;
use outcome::Outcome;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match commands::run_command(cli).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            tracing::error!(error = %err, "Fatal error");
            eprintln!("Error: {err:#}");
            Outcome::Aborted.into()
        }
    }
}
