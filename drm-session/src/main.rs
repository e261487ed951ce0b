mod commands;
mod logger;

use clap::Parser;
use colored::Colorize;
use commands::{Args, Commands};
use std::process;

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    match args.command {
        Commands::Inspect(args) => args.execute()?,
        Commands::License(args) => args.execute()?,
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".bold().red(), e);
        process::exit(1);
    }
}
