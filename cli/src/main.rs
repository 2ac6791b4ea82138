mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
  let cli_args = Cli::parse();

  let default_filter = match cli_args.verbose {
    0 => "rmulti=warn",
    1 => "rmulti=debug",
    _ => "rmulti=trace",
  };
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .init();

  match cli_args.command {
    Commands::Get(get_args) => commands::get::fetch(get_args),
  }
}
