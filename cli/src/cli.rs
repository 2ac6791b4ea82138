use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "rmulti", version, about = "rmulti Command Line Utility")]
pub struct Cli {
  /// Log verbosity (-v debug, -vv trace). RUST_LOG overrides it.
  #[clap(long, short, action = clap::ArgAction::Count, global = true)]
  pub verbose: u8,

  #[clap(subcommand)]
  pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
  /// Fetch one or more http:// URLs concurrently
  Get(GetArgs),
}

#[derive(Parser, Debug)]
pub struct GetArgs {
  /// URLs to fetch
  #[clap(required = true)]
  pub urls: Vec<String>,

  /// Connection setup timeout in milliseconds
  #[clap(long, default_value_t = 30_000)]
  pub connect_timeout_ms: u64,

  /// Abort a transfer after this many milliseconds without data
  #[clap(long, default_value_t = 60_000)]
  pub stall_timeout_ms: u64,

  /// Maximum number of transfers in flight at once
  #[clap(long)]
  pub max_active: Option<usize>,

  /// Save each body to a file in this directory instead of stdout. Bodies
  /// sent to stdout are held until their transfer ends and printed whole,
  /// in completion order
  #[clap(long, short = 'o')]
  pub output_dir: Option<PathBuf>,

  /// Print download progress to stderr
  #[clap(long, short, action)]
  pub progress: bool,
}
