//! Per-pass process snapshots
//!
//! Keeps the previous pass to tell new processes from known ones and builds
//! the command line shown in listings.

use crate::error::OsError;
use crate::models::{LiveAttributes, ProcessIdentity, ProcessSnapshot, ServiceSnapshot};
use crate::platform::ProcessControl;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

/// Manages process state tracking between polling cycles
///
/// A pid whose executable path is unchanged since the last pass only has its
/// priority, I/O priority and affinity re-read. Anything else (a new pid, or
/// a pid reused by another program) gets a full record marked `is_new`.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    snapshots: HashMap<u32, ProcessSnapshot>,
    services_unavailable: bool,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one enumeration pass and return the live `pid -> snapshot` map
    pub fn update(
        &mut self,
        control: &dyn ProcessControl,
    ) -> Result<&HashMap<u32, ProcessSnapshot>, OsError> {
        let pids = control.pids()?;
        let services = self.services_by_pid(control);

        let mut previous = std::mem::take(&mut self.snapshots);
        let mut current = HashMap::with_capacity(pids.len());

        for pid in pids {
            let cached = previous.remove(&pid);
            match Self::observe(control, pid, cached, &services) {
                Ok(snapshot) => {
                    current.insert(pid, snapshot);
                }
                Err(e) if e.is_vanished() => {}
                Err(e) => debug!("Skipping process {}: {}", pid, e),
            }
        }

        self.snapshots = current;
        Ok(&self.snapshots)
    }

    pub fn snapshots(&self) -> &HashMap<u32, ProcessSnapshot> {
        &self.snapshots
    }

    pub fn live_pids(&self) -> HashSet<u32> {
        self.snapshots.keys().copied().collect()
    }

    fn observe(
        control: &dyn ProcessControl,
        pid: u32,
        cached: Option<ProcessSnapshot>,
        services: &HashMap<u32, ServiceSnapshot>,
    ) -> Result<ProcessSnapshot, OsError> {
        if let Some(mut snapshot) = cached {
            if control.bin_path(pid)? == snapshot.bin_path {
                snapshot.refresh(control.attributes(pid)?);
                return Ok(snapshot);
            }
        }

        let identity = control.identity(pid)?;
        let attributes = control.attributes(pid)?;
        Ok(build_snapshot(pid, identity, attributes, services.get(&pid).cloned()))
    }

    fn services_by_pid(&mut self, control: &dyn ProcessControl) -> HashMap<u32, ServiceSnapshot> {
        match control.services() {
            Ok(services) => {
                self.services_unavailable = false;
                services
                    .into_iter()
                    .filter(ServiceSnapshot::is_running)
                    .map(|service| (service.pid, service))
                    .collect()
            }
            Err(e) => {
                if !self.services_unavailable {
                    warn!("Services are unavailable, only process rules apply: {}", e);
                    self.services_unavailable = true;
                }
                HashMap::new()
            }
        }
    }
}

fn build_snapshot(
    pid: u32,
    identity: ProcessIdentity,
    attributes: LiveAttributes,
    service: Option<ServiceSnapshot>,
) -> ProcessSnapshot {
    let cmd_line = command_line(pid, &identity);
    ProcessSnapshot {
        pid,
        name: identity.name,
        bin_path: identity.bin_path,
        cmd_line,
        priority: attributes.priority,
        io_priority: attributes.io_priority,
        affinity: attributes.affinity,
        service,
        is_new: true,
    }
}

/// Command line rebuilt from argv with the platform's quoting rules
pub fn command_line(pid: u32, identity: &ProcessIdentity) -> String {
    if pid == 0 || identity.argv.is_empty() {
        return String::new();
    }

    let mut argv = identity.argv.clone();
    if argv[0].is_empty() {
        argv[0] = if identity.bin_path.is_empty() {
            identity.name.clone()
        } else {
            identity.bin_path.clone()
        };
    }

    join_args(&argv)
}

#[cfg(not(windows))]
fn join_args(argv: &[String]) -> String {
    join_posix(argv)
}

#[cfg(windows)]
fn join_args(argv: &[String]) -> String {
    join_windows(argv)
}

/// POSIX shell quoting: safe words stay bare, anything else is single-quoted
pub fn join_posix(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote_posix(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_posix(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    let safe = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

/// Quoting understood by `CommandLineToArgvW`
pub fn join_windows(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote_windows(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_windows(arg: &str) -> String {
    let needs_quotes = arg.is_empty() || arg.contains([' ', '\t']);
    let mut quoted = String::with_capacity(arg.len() + 2);
    let mut backslashes = 0;

    if needs_quotes {
        quoted.push('"');
    }

    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            other => {
                quoted.push_str(&"\\".repeat(backslashes));
                quoted.push(other);
                backslashes = 0;
            }
        }
    }

    if needs_quotes {
        quoted.push_str(&"\\".repeat(backslashes * 2));
        quoted.push('"');
    } else {
        quoted.push_str(&"\\".repeat(backslashes));
    }

    quoted
}
