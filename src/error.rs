//! Error types for the governor
//!
//! One enum per concern so callers can tell benign per-process failures
//! (vanished process, permission denied) from loop-level and startup failures.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures while reading, parsing or validating the rule file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule {section}[{index}]: {reason}")]
    InvalidRule {
        section: &'static str,
        index: usize,
        reason: String,
    },

    #[error("invalid affinity `{value}`: {reason}")]
    InvalidAffinity { value: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Failures of the configuration migration chain
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration `{name}` failed: {reason}")]
    Step { name: &'static str, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MigrationError {
    pub fn step(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Step {
            name,
            reason: reason.into(),
        }
    }
}

/// Failures reported by the operating system layer
#[derive(Debug, Error)]
pub enum OsError {
    /// The process exited between enumeration and the call
    #[error("process {pid} no longer exists")]
    ProcessVanished { pid: u32 },

    #[error("access denied to {operation} of process {pid}")]
    PermissionDenied { pid: u32, operation: &'static str },

    #[error("failed to {operation} of process {pid}: {details}")]
    Call {
        pid: u32,
        operation: &'static str,
        details: String,
    },

    #[error("failed to enumerate {what}: {details}")]
    Enumeration { what: &'static str, details: String },

    #[error("unsupported platform: {0}")]
    Unsupported(String),
}

impl OsError {
    pub fn is_vanished(&self) -> bool {
        matches!(self, Self::ProcessVanished { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Failures while resolving which rule governs a process
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Unknown selector type: {0}")]
    UnknownSelectorType(String),
}

/// Errors escaping one iteration of the main loop
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Os(#[from] OsError),
}

/// Single-instance lock failures
#[derive(Debug, Error)]
pub enum LockError {
    #[error("the application is already running (pid {pid}); close the existing instance before starting a new one")]
    AlreadyRunning { pid: u32 },

    #[error("failed to access lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
