//! AMAC CLI - maps OpenAPI endpoints and probes them, unauthenticated and
//! under credentialed identities, to surface broken-authorization issues.

use clap::Parser;
use colored::Colorize;

mod auth;
mod cli;
mod client;
mod config;
mod error;
mod evidence;
mod mapper;
mod models;
mod output;
mod probe;
mod spec;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(err) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    eprintln!(
        "{} Authorized targets only. Respect program scope, rate limits, and ToS.",
        "WARNING:".yellow().bold()
    );

    match cli.command {
        Commands::Map(args) => cli::map::run(args).await,
        Commands::Check(args) => cli::check::run(args).await,
        Commands::Probe(args) => cli::probe::run(args).await,
        Commands::Version => {
            println!("amac version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
