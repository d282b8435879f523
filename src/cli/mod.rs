//! CLI argument parsing module
//!
//! Handles the command-line interface using clap:
//! - `run` (default): the governor loop
//! - `migrate`, `check`: one-shot maintenance of the rule file
//! - `list`: one enumeration pass against the rule set
//! - Global rule file and logging options

use crate::constants::{APP_BINARY, CONFIG_FILE_NAME, LOG_FILE_NAME};
use crate::daemon::logging::LogOptions;
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

const VERSION: &str = concat!(env!("PROCGOV_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Run,
    Migrate,
    Check,
    List { json: bool, all: bool },
}

#[derive(Debug, Clone)]
pub struct CliOptions {
    pub command: CliCommand,
    pub config_path: PathBuf,
    pub log: LogOptions,
}

/// The full command definition
pub fn build_command() -> Command {
    Command::new(APP_BINARY)
        .version(VERSION)
        .about("Keep process priority, I/O priority and CPU affinity in line with a rule file")
        .long_about(
            "Continuously applies a JSON rule set to running processes and services, \
             adjusting their scheduling priority, I/O priority and CPU core affinity.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Rule file to load")
                .default_value(CONFIG_FILE_NAME)
                .global(true),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("PATH")
                .help("File receiving the log")
                .default_value(LOG_FILE_NAME)
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter used when RUST_LOG is not set")
                .default_value("info")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not log to the console")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("run").about("Run the governor until interrupted (default)"))
        .subcommand(Command::new("migrate").about("Upgrade the rule file to the current schema"))
        .subcommand(Command::new("check").about("Validate the rule file and report every bad rule"))
        .subcommand(
            Command::new("list")
                .about("Show running processes and the rule governing each")
                .arg(
                    Arg::new("json")
                        .short('j')
                        .long("json")
                        .help("Output in JSON format")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .help("Include processes no rule matches")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Parse the process arguments, exiting on `--help`, `--version` or errors
pub fn parse_args() -> CliOptions {
    from_matches(&build_command().get_matches())
}

pub fn try_parse_from<I, T>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().try_get_matches_from(args)?;
    Ok(from_matches(&matches))
}

fn from_matches(matches: &ArgMatches) -> CliOptions {
    let command = match matches.subcommand() {
        Some(("migrate", _)) => CliCommand::Migrate,
        Some(("check", _)) => CliCommand::Check,
        Some(("list", sub)) => CliCommand::List {
            json: sub.get_flag("json"),
            all: sub.get_flag("all"),
        },
        _ => CliCommand::Run,
    };

    let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

    CliOptions {
        command,
        config_path: PathBuf::from(string("config")),
        log: LogOptions {
            file: PathBuf::from(string("log-file")),
            level: string("log-level"),
            quiet: matches.get_flag("quiet"),
        },
    }
}
