//! Main entry point for the fastlease command line tool.

use std::process::ExitCode;

use clap::Parser;
use fastlease_cli::commands;
use fastlease_cli::config::{Cli, Configuration};
use fastlease_cli::logging;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;

    let _logging_guard = logging::init_logging(&configuration.logging_config())?;
    fastlease_core::metrics::describe_metrics();

    commands::execute(cli.command, &configuration).await
}
