mod args;
mod commands;

use anyhow::Result;
use args::{Args, Command};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;

    let config = commands::resolve_config(&args)?;

    match &args.command {
        Command::Diagnose {
            paths,
            caller_id,
            jsonl,
        } => commands::diagnose::run(&config, paths, caller_id.as_deref(), *jsonl),
        Command::Plants => commands::model::plants(&config),
        Command::Inspect => commands::model::inspect(&config),
    }
}
