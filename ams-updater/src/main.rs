//! AMS Updater - Main entry point
//!
//! Runs one update from a staging directory and reports the outcome through
//! the process exit code.

use ams_updater::update::{EXIT_COMMITTED, EXIT_FATAL};
use ams_updater::{db, fs::SystemHost, utils, Config, StagingArea, UpdateOrchestrator};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Staging directory holding manifest.toml (overrides config)
    #[arg(short, long, value_name = "DIR")]
    staging: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the staged manifest and print a summary without applying it
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(args: Args) -> Result<u8> {
    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(staging) = args.staging {
        config.paths.staging_dir = staging;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting ams-updater v{} (device: {})",
        env!("CARGO_PKG_VERSION"),
        config.device.id
    );

    let staging = StagingArea::new(&config.paths.staging_dir);
    let manifest = staging
        .load_manifest()
        .with_context(|| format!("loading manifest from {}", staging.root().display()))?;

    if args.check {
        println!("{}", manifest.summary());
        return Ok(EXIT_COMMITTED);
    }

    let host = SystemHost;
    let mut orchestrator = UpdateOrchestrator::new(&host, &config);
    let outcome = orchestrator.run(&manifest, &staging, || db::open(&config.paths.database));

    match outcome {
        Ok(report) => {
            let code = report.outcome().exit_code();
            tracing::info!(
                outcome = ?report.outcome(),
                failures = report.result.failure_count(),
                exit_code = code,
                "Update finished"
            );
            Ok(code)
        }
        Err(e) => {
            if e.is_fatal() {
                tracing::error!(error = %e, "Device needs manual recovery");
            } else {
                tracing::error!(state = %orchestrator.state(), error = %e, "Update did not run");
            }
            Ok(EXIT_FATAL)
        }
    }
}
