//! Single-instance lock
//!
//! A lock file beside the rule file holds the pid of the running governor.
//! A lock left behind by a process that is gone, or that is not a governor,
//! is stale and taken over.

use crate::constants::APP_BINARY;
use crate::error::LockError;
use log::{debug, error};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Held while the governor runs; removes the lock file on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        Self::acquire_with(path, is_governor_running)
    }

    /// Acquire using `is_running` to decide whether a recorded pid is a live
    /// governor
    pub fn acquire_with(
        path: impl Into<PathBuf>,
        is_running: impl Fn(u32) -> bool,
    ) -> Result<Self, LockError> {
        let path = path.into();
        let own_pid = std::process::id();

        if let Some(pid) = read_pid(&path)? {
            if pid != own_pid && is_running(pid) {
                let err = LockError::AlreadyRunning { pid };
                error!("{}", err);
                return Err(err);
            }
            debug!("Taking over stale lock of pid {}", pid);
        }

        fs::write(&path, own_pid.to_string()).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>, LockError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Whether `pid` is alive and is a governor
pub fn is_governor_running(pid: u32) -> bool {
    let mut system = System::new();
    let target = [Pid::from_u32(pid)];
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&target),
        true,
        ProcessRefreshKind::nothing(),
    );

    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| process.name().to_string_lossy() == APP_BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid_and_drop_removes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("procgov.lock");

        {
            let lock = InstanceLock::acquire_with(&path, |_| false).unwrap();
            let content = fs::read_to_string(lock.path()).unwrap();
            assert_eq!(content, std::process::id().to_string());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_live_owner_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("procgov.lock");
        fs::write(&path, "4242").unwrap();

        let err = InstanceLock::acquire_with(&path, |pid| pid == 4242).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning { pid: 4242 }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242");
    }

    #[test]
    fn test_stale_or_garbage_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("procgov.lock");

        fs::write(&path, "4242").unwrap();
        drop(InstanceLock::acquire_with(&path, |_| false).unwrap());

        fs::write(&path, "not a pid").unwrap();
        let _lock = InstanceLock::acquire_with(&path, |_| true).unwrap();
    }

    #[test]
    fn test_test_runner_is_not_a_governor() {
        assert!(!is_governor_running(std::process::id()));
    }
}
