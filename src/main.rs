#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use procgov::cli::{self, CliCommand, CliOptions};
use procgov::config::ConfigStore;
use procgov::daemon::{self, logging, notify::LogNotifier};
use procgov::monitor::ProcessTracker;
use procgov::output;
use procgov::platform::detect_platform;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> Result<ExitCode> {
    let options = cli::parse_args();
    let _guard = logging::init_logging(&options.log)?;

    let result = dispatch(&options);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn dispatch(options: &CliOptions) -> Result<ExitCode> {
    let store = ConfigStore::new(&options.config_path);

    match &options.command {
        CliCommand::Run => {
            daemon::run_governor(&options.config_path, Arc::new(LogNotifier))?;
        }
        CliCommand::Migrate => {
            let report = daemon::run_migrations(&store)?;
            if report.is_empty() {
                println!("Configuration is already at the current version.");
            }
            for (name, version) in &report.applied {
                println!("Applied {} (version {})", name, version);
            }
            if let Some(backup) = &report.backup {
                println!("Backup: {}", backup.display());
            }
        }
        CliCommand::Check => {
            let errors = daemon::check_config(&store);
            if !errors.is_empty() {
                for error in &errors {
                    println!("{}", error);
                }
                return Ok(ExitCode::FAILURE);
            }
            println!("{}: OK", store.path().display());
        }
        CliCommand::List { json, all } => {
            let config = store.load()?;
            let control = detect_platform().context("No process control backend for this platform")?;
            let mut tracker = ProcessTracker::new();
            let snapshots = tracker.update(control.as_ref())?;

            let listing = output::build_listing(&config, snapshots, *all);
            if *json {
                output::format_json(&listing)?;
            } else {
                output::format_human(&listing)?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
