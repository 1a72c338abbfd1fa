//! CLI entry point for the harvester tool.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    match app::runtime::run(cli).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            app::exit::ProcessExit::Failure.into()
        }
    }
}
