//! Global constants for procgov
//!
//! Centralized location for application-wide constants

/// Application name used in log lines and notifications
pub const APP_NAME: &str = "Process Governor";

/// Binary name, also used to recognize a running instance
pub const APP_BINARY: &str = "procgov";

/// Default rule file, relative to the working directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default log file, relative to the working directory
pub const LOG_FILE_NAME: &str = "logging.txt";

/// Lock file created next to the rule file while the governor runs
pub const LOCK_FILE_NAME: &str = "procgov.lock";

/// Schema version written by the last migration
pub const CURRENT_CONFIG_VERSION: u64 = 3;

/// Default seconds between rule application passes
pub const DEFAULT_RULE_APPLY_INTERVAL_SECS: u64 = 1;

/// How often the failure memo is pruned of exited processes
pub const FAILURE_MEMO_GC_INTERVAL_SECS: u64 = 5;

/// How long an enumerated service list is reused
pub const SERVICE_CACHE_TTL_SECS: u64 = 1;

/// Granularity of the loop's interruptible sleep
pub const SHUTDOWN_POLL_MILLIS: u64 = 100;

/// Event names used in structured lifecycle log lines
pub const EVENT_STARTUP: &str = "governor_startup";
pub const EVENT_SHUTDOWN: &str = "governor_shutdown";
pub const EVENT_CONFIG_CHANGED: &str = "config_changed";
