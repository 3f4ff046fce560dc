//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads the configuration
//! - runs the fetch and/or build pipelines
//! - prints summaries and turns dataset failures into an exit code

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{BuildArgs, Command, FetchArgs, ShowArgs};
use crate::config::Config;
use crate::data::AnySource;
use crate::engine::{Clock, FixedClock, RegionCounts, SystemClock};
use crate::error::AppError;
use crate::io::store::{JsonDirStore, load_json, load_series};

pub mod pipeline;

/// Entry point for the `epi` binary.
pub fn run() -> Result<(), AppError> {
    // Bare `epi` (or `epi --verbose`) runs the daily job.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_tracing(cli.verbose);

    match cli.command {
        Command::Show(args) => handle_show(&args),
        Command::Fetch(args) => {
            let (config, config_dir) = load_config(cli.config.as_deref())?;
            handle_fetch(&config, &config_dir, &args)
        }
        Command::Build(args) => {
            let (config, _) = load_config(cli.config.as_deref())?;
            handle_build(&config, &args)
        }
        Command::Run(args) => {
            let (config, config_dir) = load_config(cli.config.as_deref())?;
            handle_run(&config, &config_dir, &args)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .try_init();
}

/// Load the config and return it with the directory relative source paths resolve against.
fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf), AppError> {
    let path = Config::resolve_path(explicit);
    let config = Config::load(&path)
        .map_err(|e| AppError::new(2, format!("Failed to load config '{}': {e}", path.display())))?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, dir))
}

/// The clock for this invocation, read once so every phase sees the same instant.
fn make_clock(config: &Config, args: &FetchArgs) -> Result<FixedClock, AppError> {
    let now = SystemClock::with_offset_hours(config.utc_offset_hours)?.now();
    match args.today {
        None => Ok(FixedClock::new(now)),
        Some(date) => {
            // Keep the wall-clock time of day so `last_update` still looks like a real stamp.
            let time: NaiveTime = now.time();
            Ok(FixedClock::at(date, time, config.utc_offset_hours)?)
        }
    }
}

fn handle_fetch(config: &Config, config_dir: &Path, args: &FetchArgs) -> Result<(), AppError> {
    let clock = make_clock(config, args)?;
    let source = AnySource::new(config_dir);
    let origin = JsonDirStore::new(&args.origin_dir);

    let report = pipeline::run_fetch(config, &source, &clock, &origin);
    println!("{}", crate::report::format_fetch_summary(&report));
    fail_on(&report.failures)
}

fn handle_build(config: &Config, args: &BuildArgs) -> Result<(), AppError> {
    let clock = make_clock(config, &args.fetch)?;
    let origin = JsonDirStore::new(&args.fetch.origin_dir);
    let previous = JsonDirStore::new(&args.previous_dir);
    let output = JsonDirStore::new(&args.out_dir);

    let ctx = pipeline::BuildContext {
        config,
        origin: &origin,
        previous: &previous,
        output: &output,
        today: clock.today(),
        failed_sources: BTreeSet::new(),
    };
    let report = pipeline::run_build(&ctx);
    println!("{}", crate::report::format_build_summary(&report));
    fail_on(&report.failures)
}

/// Fetch, then build everything whose sources arrived.
fn handle_run(config: &Config, config_dir: &Path, args: &BuildArgs) -> Result<(), AppError> {
    let clock = make_clock(config, &args.fetch)?;
    let source = AnySource::new(config_dir);
    let origin = JsonDirStore::new(&args.fetch.origin_dir);
    let previous = JsonDirStore::new(&args.previous_dir);
    let output = JsonDirStore::new(&args.out_dir);
    let stores = pipeline::DailyStores {
        origin: &origin,
        previous: &previous,
        output: &output,
    };

    let (fetched, built) = pipeline::run_daily(config, &source, &clock, stores);
    println!("{}", crate::report::format_fetch_summary(&fetched));
    println!("{}", crate::report::format_build_summary(&built));

    let mut failures = fetched.failures;
    failures.extend(built.failures);
    fail_on(&failures)
}

fn handle_show(args: &ShowArgs) -> Result<(), AppError> {
    let store = JsonDirStore::new(&args.dir);
    if args.key == pipeline::REGION_COUNTS_KEY {
        let counts: RegionCounts = load_json(&store, &args.key)?;
        println!("{}", crate::report::format_region_counts(&counts));
        return Ok(());
    }
    let series = load_series(&store, &args.key)?;
    println!("{}", crate::report::format_series_summary(&args.key, &series));
    Ok(())
}

/// Collapse per-dataset failures into one error carrying the most severe exit code.
fn fail_on(failures: &[AppError]) -> Result<(), AppError> {
    let Some(code) = failures.iter().map(AppError::exit_code).max() else {
        return Ok(());
    };
    let names: Vec<String> = failures.iter().map(ToString::to_string).collect();
    Err(AppError::new(
        code,
        format!("{} dataset(s) failed:\n  {}", failures.len(), names.join("\n  ")),
    ))
}

/// Rewrite argv so `epi` defaults to `epi run`.
///
/// Leading global flags (`--config <path>`, `-v`) are skipped before deciding.
///
/// Rules:
/// - `epi`                         -> `epi run`
/// - `epi --today 2021-05-13`      -> `epi run --today 2021-05-13`
/// - `epi --config c.json build`   -> unchanged
/// - `epi --help/--version/-h`     -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let mut idx = 1;
    while let Some(arg) = argv.get(idx) {
        match arg.as_str() {
            "--config" => idx += 2,
            "-v" | "--verbose" => idx += 1,
            a if a.starts_with("--config=") => idx += 1,
            _ => break,
        }
    }

    let Some(next) = argv.get(idx).cloned() else {
        argv.insert(1, "run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        next.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(next.as_str(), "fetch" | "build" | "run" | "show");
    if is_subcommand {
        return argv;
    }

    if next.starts_with('-') {
        argv.insert(1, "run".to_string());
        return argv;
    }

    argv
}
