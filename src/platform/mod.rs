//! Operating system seam
//!
//! `ProcessControl` is the only place the engine touches the OS: pid
//! enumeration, identity and attribute reads, the three setters, service
//! enumeration and elevation. The Linux implementation lives in `linux`.

pub mod services;

#[cfg(target_os = "linux")]
pub mod linux;

use crate::error::OsError;
use crate::models::{IoPriority, LiveAttributes, Priority, ProcessIdentity, ServiceSnapshot};
use std::sync::Arc;

/// OS operations the engine needs
pub trait ProcessControl: Send + Sync {
    /// Every live pid
    fn pids(&self) -> Result<Vec<u32>, OsError>;

    /// Executable path, empty when unreadable. Cheap: called for every pid on
    /// every pass to detect pid reuse.
    fn bin_path(&self, pid: u32) -> Result<String, OsError>;

    /// Name, executable path and argv, read fresh
    fn identity(&self, pid: u32) -> Result<ProcessIdentity, OsError>;

    fn attributes(&self, pid: u32) -> Result<LiveAttributes, OsError>;

    /// Running services with a main process
    fn services(&self) -> Result<Vec<ServiceSnapshot>, OsError>;

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OsError>;

    fn set_io_priority(&self, pid: u32, io_priority: IoPriority) -> Result<(), OsError>;

    fn set_affinity(&self, pid: u32, cores: &[usize]) -> Result<(), OsError>;

    /// Cores the scheduler can place threads on, sorted
    fn online_cores(&self) -> Vec<usize>;

    /// Whether the governor runs with administrative rights
    fn is_elevated(&self) -> bool;

    fn current_pid(&self) -> u32 {
        std::process::id()
    }
}

/// The process control backend for the running OS
pub fn detect_platform() -> Result<Arc<dyn ProcessControl>, OsError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::LinuxControl::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(OsError::Unsupported(std::env::consts::OS.to_string()))
    }
}

/// Nice value requested for each priority class
pub fn priority_to_nice(priority: Priority) -> i32 {
    match priority {
        Priority::Idle => 19,
        Priority::BelowNormal => 10,
        Priority::Normal => 0,
        Priority::AboveNormal => -5,
        Priority::High => -10,
        Priority::Realtime => -20,
    }
}

/// Priority class for a nice value; `None` for values no class maps to
pub fn nice_to_priority(nice: i32) -> Option<Priority> {
    Priority::ALL
        .into_iter()
        .find(|priority| priority_to_nice(*priority) == nice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_mapping_is_reversible() {
        for priority in Priority::ALL {
            assert_eq!(nice_to_priority(priority_to_nice(priority)), Some(priority));
        }
    }

    #[test]
    fn test_unmapped_nice_is_unknown() {
        assert_eq!(nice_to_priority(3), None);
        assert_eq!(nice_to_priority(-1), None);
    }
}
