//! Governor runtime
//!
//! Startup sequence for `procgov run`:
//! - single-instance lock beside the rule file
//! - migration of the rule file (fatal on failure)
//! - lower the governor's own scheduling priority
//! - the `governor-loop` thread, stopped by SIGINT/SIGTERM

pub mod lock;
pub mod logging;
pub mod notify;

use crate::config::migration::{all_migrations, run_all_migrations, MigrationReport};
use crate::config::{rule_errors, Config, ConfigStore};
use crate::constants::{LOCK_FILE_NAME, SHUTDOWN_POLL_MILLIS};
use crate::error::MigrationError;
use crate::models::{IoPriority, Priority};
use crate::monitor::Governor;
use crate::platform::{detect_platform, ProcessControl};
use crate::scheduler::SystemClock;
use anyhow::{anyhow, Context, Result};
use lock::InstanceLock;
use log::{debug, info};
use logging::GovernorLogger;
use notify::{Notification, Notifier};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Lock file used for a given rule file
pub fn lock_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(LOCK_FILE_NAME)
}

/// Bring the rule file up to the current schema version
pub fn run_migrations(store: &ConfigStore) -> Result<MigrationReport, MigrationError> {
    let report = run_all_migrations(store, &all_migrations())?;

    if report.is_empty() {
        debug!("Configuration is up to date");
    } else if let Some(backup) = &report.backup {
        info!("Configuration backed up to {}", backup.display());
    }

    Ok(report)
}

/// Every problem with the rule file, empty when it loads cleanly
pub fn check_config(store: &ConfigStore) -> Vec<String> {
    let raw = match store.load_raw() {
        Ok(raw) => raw,
        Err(e) => return vec![e.to_string()],
    };

    let mut errors = rule_errors(&raw);
    if errors.is_empty() {
        if let Err(e) = Config::from_value(raw) {
            errors.push(e.to_string());
        }
    }

    errors
}

/// Keep the governor itself out of the way of the processes it manages
fn lower_own_priority(control: &dyn ProcessControl) {
    let pid = control.current_pid();

    if let Err(e) = control.set_priority(pid, Priority::BelowNormal) {
        debug!("Could not lower own priority: {}", e);
    }
    if let Err(e) = control.set_io_priority(pid, IoPriority::Low) {
        debug!("Could not lower own I/O priority: {}", e);
    }
}

/// Run the governor until SIGINT or SIGTERM
pub fn run_governor(config_path: &Path, notifier: Arc<dyn Notifier>) -> Result<()> {
    let _lock = InstanceLock::acquire(lock_path_for(config_path))?;
    let logger = GovernorLogger::new();
    logger.log_startup(config_path, std::process::id());

    let store = ConfigStore::new(config_path);
    if let Err(e) = run_migrations(&store) {
        let message = e.to_string();
        logger.log_error("Failed to migrate the configuration.", Some(message.as_str()));
        notifier.notify(Notification::EngineFailure {
            message,
            fatal: true,
        });
        logger.log_shutdown("migration failure");
        return Err(e.into());
    }

    let control = detect_platform().context("No process control backend for this platform")?;
    lower_own_priority(control.as_ref());

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let running = Arc::new(AtomicBool::new(true));
    let loop_running = Arc::clone(&running);
    let handle = thread::Builder::new()
        .name("governor-loop".to_string())
        .spawn(move || {
            let mut governor = Governor::new(store, control, notifier, SystemClock::shared());
            governor.run(&loop_running);
        })
        .context("Failed to start the governor loop")?;

    while !shutdown.load(Ordering::SeqCst) && !handle.is_finished() {
        thread::sleep(Duration::from_millis(SHUTDOWN_POLL_MILLIS));
    }

    running.store(false, Ordering::SeqCst);
    let reason = if shutdown.load(Ordering::SeqCst) {
        "signal"
    } else {
        "loop exited"
    };

    handle
        .join()
        .map_err(|_| anyhow!("Governor loop panicked"))?;
    logger.log_shutdown(reason);

    Ok(())
}
