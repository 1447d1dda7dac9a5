mod artifact;
mod cli;
mod commands;
mod diff;
mod model;
mod normalize;
mod parsers;
mod storage;
mod trace;
mod util;
mod validation;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::ListRuns(args) => commands::list_runs::run(args),
        Commands::Probe(args) => commands::probe::run(args),
        Commands::TypeProbe(args) => commands::type_probe::run(args),
        Commands::Explain(args) => commands::explain::run(args),
        Commands::Score(args) => commands::score::run(args),
        Commands::Grid(args) => commands::grid::run(args),
        Commands::Check(args) => commands::check::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
