mod cli;
mod commands;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let output = commands::run(&cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
