//! Command-line parsing.
//!
//! Parsing and dispatch stay separate from the pipeline code so the library
//! can be driven without a process.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "epi", version, about = "Daily epidemiological open-data series builder")]
pub struct Cli {
    /// Config file (defaults to $EPI_CONFIG, then ./epi.json).
    #[arg(long, global = true, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every configured source and store normalized snapshots.
    Fetch(FetchArgs),
    /// Merge stored snapshots into the published series.
    Build(BuildArgs),
    /// Fetch, then build (the daily job).
    Run(BuildArgs),
    /// Print a summary of a stored series.
    Show(ShowArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// Directory for normalized source snapshots.
    #[arg(long, default_value = "origin_data")]
    pub origin_dir: PathBuf,

    /// Pretend today is this date (YYYY-MM-DD) in the configured time zone.
    #[arg(long, value_name = "DATE")]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Args, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Directory holding the series published by the previous run.
    #[arg(long, default_value = "previous_data")]
    pub previous_dir: PathBuf,

    /// Directory the merged outputs are written to.
    #[arg(long, default_value = "data")]
    pub out_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Dataset key, e.g. `patients_cnt`.
    pub key: String,

    /// Directory to read from.
    #[arg(long, default_value = "data")]
    pub dir: PathBuf,
}
