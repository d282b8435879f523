//! Log backend and structured lifecycle lines
//!
//! Library code logs through the `log` facade. The binary installs a
//! `tracing-subscriber` registry that writes to the console and, through a
//! non-blocking `tracing-appender` writer, to the log file; `log` records are
//! forwarded into it by the subscriber's `tracing-log` bridge.

use crate::constants::{EVENT_CONFIG_CHANGED, EVENT_SHUTDOWN, EVENT_STARTUP};
use anyhow::{Context, Result};
use log::{error, info};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where and how much to log
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub file: PathBuf,
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Skip the console layer
    pub quiet: bool,
}

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered file lines are flushed.
pub fn init_logging(options: &LogOptions) -> Result<WorkerGuard> {
    let directory = options
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let file_name = options
        .file
        .file_name()
        .context("Log file path has no file name")?;

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .with_context(|| format!("Invalid log level: {}", options.level))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    let console_layer = (!options.quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

/// Emits lifecycle events as a message plus a JSON payload
#[derive(Debug, Clone, Default)]
pub struct GovernorLogger;

impl GovernorLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn log_startup(&self, config_path: &Path, pid: u32) {
        info!("Application started");
        self.log_structured(LogLevel::Info, "Governor started", &startup_payload(config_path, pid));
    }

    pub fn log_shutdown(&self, reason: &str) {
        self.log_structured(LogLevel::Info, "Governor shutting down", &shutdown_payload(reason));
        info!("The application has stopped");
    }

    pub fn log_config_change(&self, config_path: &Path, process_rules: usize, service_rules: usize) {
        info!("Configuration file has been modified. Reloading all rules to apply changes.");
        self.log_structured(
            LogLevel::Info,
            "Configuration reloaded",
            &config_change_payload(config_path, process_rules, service_rules),
        );
    }

    pub fn log_error(&self, message: &str, context: Option<&str>) {
        let payload = json!({
            "event": "error",
            "message": message,
            "context": context,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.log_structured(LogLevel::Error, message, &payload);
    }

    fn log_structured(&self, level: LogLevel, message: &str, data: &Value) {
        match level {
            LogLevel::Error => error!("{} | {}", message, data),
            LogLevel::Info => info!("{} | {}", message, data),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Error,
    Info,
}

fn startup_payload(config_path: &Path, pid: u32) -> Value {
    json!({
        "event": EVENT_STARTUP,
        "pid": pid,
        "config_path": config_path.display().to_string(),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

fn shutdown_payload(reason: &str) -> Value {
    json!({
        "event": EVENT_SHUTDOWN,
        "reason": reason,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

fn config_change_payload(config_path: &Path, process_rules: usize, service_rules: usize) -> Value {
    json!({
        "event": EVENT_CONFIG_CHANGED,
        "config_path": config_path.display().to_string(),
        "process_rules": process_rules,
        "service_rules": service_rules,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
