use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod query;
mod rx;
mod tx;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);
    match args.cmd {
        cli::Cmd::Write(opts) => tx::run(opts),
        cli::Cmd::Read(opts) => rx::run(opts),
        cli::Cmd::Query(opts) => query::run(opts),
        cli::Cmd::Commands(opts) => commands::run(opts),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
