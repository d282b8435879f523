//! Linux process control
//!
//! Processes come from `sysinfo`; priority maps to the nice value, I/O
//! priority to the `ioprio` class and level, affinity to the scheduler CPU
//! mask. Setters walk every thread of the target because Linux scopes nice,
//! ioprio and affinity per thread.

#![allow(unsafe_code)]

use super::services::list_services;
use super::{nice_to_priority, priority_to_nice, ProcessControl};
use crate::config::affinity::parse_affinity;
use crate::constants::SERVICE_CACHE_TTL_SECS;
use crate::error::OsError;
use crate::models::{IoPriority, LiveAttributes, Priority, ProcessIdentity, ServiceSnapshot};
use crate::scheduler::{SystemClock, TtlCache};
use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::{geteuid, Pid as NixPid};
use parking_lot::Mutex;
use std::fs;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

const IOPRIO_WHO_PROCESS: libc::c_int = 1;
const IOPRIO_CLASS_SHIFT: libc::c_int = 13;
const IOPRIO_CLASS_NONE: libc::c_int = 0;
const IOPRIO_CLASS_BE: libc::c_int = 2;
const IOPRIO_CLASS_IDLE: libc::c_int = 3;

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

pub struct LinuxControl {
    system: Mutex<System>,
    services: Mutex<TtlCache<(), Vec<ServiceSnapshot>>>,
    online_cores: Vec<usize>,
}

impl Default for LinuxControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxControl {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            services: Mutex::new(TtlCache::new(
                Duration::from_secs(SERVICE_CACHE_TTL_SECS),
                SystemClock::shared(),
            )),
            online_cores: read_online_cores(),
        }
    }

    /// Threads show up in `/proc` like processes; they are handled through
    /// their process instead
    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .without_tasks()
            .with_exe(UpdateKind::Always)
            .with_cmd(UpdateKind::Always)
    }

    /// Thread ids of `pid`, falling back to the pid itself
    fn threads_of(pid: u32) -> Vec<u32> {
        let mut tids: Vec<u32> = fs::read_dir(format!("/proc/{}/task", pid))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        if tids.is_empty() {
            tids.push(pid);
        }
        tids
    }

    /// Run `set` on every thread. The main thread's failure is the process's
    /// failure; threads exiting meanwhile are ignored.
    fn for_each_thread(
        pid: u32,
        operation: &'static str,
        mut set: impl FnMut(u32) -> Result<(), Errno>,
    ) -> Result<(), OsError> {
        set(pid).map_err(|errno| errno_to_os_error(pid, operation, errno))?;

        for tid in Self::threads_of(pid).into_iter().filter(|tid| *tid != pid) {
            match set(tid) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => return Err(errno_to_os_error(pid, operation, errno)),
            }
        }

        Ok(())
    }
}

fn errno_to_os_error(pid: u32, operation: &'static str, errno: Errno) -> OsError {
    match errno {
        Errno::ESRCH => OsError::ProcessVanished { pid },
        Errno::EPERM | Errno::EACCES => OsError::PermissionDenied { pid, operation },
        other => OsError::Call {
            pid,
            operation,
            details: other.desc().to_string(),
        },
    }
}

fn get_nice(pid: u32) -> Result<i32, Errno> {
    Errno::clear();
    // SAFETY: getpriority reads scheduler state and touches no memory we own
    let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
    if value == -1 {
        let errno = Errno::last();
        if errno != Errno::UnknownErrno {
            return Err(errno);
        }
    }
    Ok(value)
}

fn set_nice(tid: u32, nice: i32) -> Result<(), Errno> {
    // SAFETY: setpriority only changes scheduler state of the target thread
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid as libc::id_t, nice) };
    Errno::result(result).map(drop)
}

fn get_ioprio(pid: u32) -> Result<libc::c_int, Errno> {
    // SAFETY: ioprio_get takes two integers and returns an integer
    let result = unsafe {
        libc::syscall(
            libc::SYS_ioprio_get,
            IOPRIO_WHO_PROCESS,
            pid as libc::c_int,
        )
    };
    Errno::result(result).map(|value| value as libc::c_int)
}

fn set_ioprio(tid: u32, value: libc::c_int) -> Result<(), Errno> {
    // SAFETY: ioprio_set takes three integers and returns an integer
    let result = unsafe {
        libc::syscall(
            libc::SYS_ioprio_set,
            IOPRIO_WHO_PROCESS,
            tid as libc::c_int,
            value,
        )
    };
    Errno::result(result).map(drop)
}

fn ioprio_value(class: libc::c_int, level: libc::c_int) -> libc::c_int {
    (class << IOPRIO_CLASS_SHIFT) | level
}

/// `ioprio` value requested for each I/O priority class
pub fn io_priority_to_ioprio(io_priority: IoPriority) -> libc::c_int {
    match io_priority {
        IoPriority::VeryLow => ioprio_value(IOPRIO_CLASS_IDLE, 0),
        IoPriority::Low => ioprio_value(IOPRIO_CLASS_BE, 7),
        IoPriority::Normal => ioprio_value(IOPRIO_CLASS_BE, 4),
        IoPriority::High => ioprio_value(IOPRIO_CLASS_BE, 0),
    }
}

/// I/O priority class of an `ioprio` value. Class `none` follows the nice
/// value the way the kernel does.
pub fn ioprio_to_io_priority(value: libc::c_int, nice: i32) -> Option<IoPriority> {
    let class = value >> IOPRIO_CLASS_SHIFT;
    let level = match class {
        IOPRIO_CLASS_IDLE => return Some(IoPriority::VeryLow),
        IOPRIO_CLASS_BE => value & ((1 << IOPRIO_CLASS_SHIFT) - 1),
        IOPRIO_CLASS_NONE => (nice.clamp(-20, 19) + 20) / 5,
        _ => return None,
    };

    match level {
        7 => Some(IoPriority::Low),
        4 => Some(IoPriority::Normal),
        0 => Some(IoPriority::High),
        _ => None,
    }
}

/// Online cores from sysfs (`0-3,6`), falling back to the available
/// parallelism. Cores past what `CpuSet` can hold are left out.
fn read_online_cores() -> Vec<usize> {
    let listed = fs::read_to_string(ONLINE_CPUS_PATH)
        .ok()
        .and_then(|content| parse_affinity(&content.trim().replace(',', ";")).ok());

    let cores = listed.unwrap_or_else(|| {
        let count = std::thread::available_parallelism().map_or(1, |n| n.get());
        (0..count).collect()
    });

    cores
        .into_iter()
        .filter(|core| *core < CpuSet::count())
        .collect()
}

fn nix_pid(pid: u32) -> NixPid {
    NixPid::from_raw(pid as libc::pid_t)
}

fn get_affinity(pid: u32) -> Result<Vec<usize>, Errno> {
    let set = sched_getaffinity(nix_pid(pid))?;
    Ok((0..CpuSet::count())
        .filter(|core| set.is_set(*core).unwrap_or(false))
        .collect())
}

impl ProcessControl for LinuxControl {
    fn pids(&self) -> Result<Vec<u32>, OsError> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());

        Ok(system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, _)| pid.as_u32())
            .collect())
    }

    fn bin_path(&self, pid: u32) -> Result<String, OsError> {
        let system = self.system.lock();
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(OsError::ProcessVanished { pid })?;

        Ok(process
            .exe()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn identity(&self, pid: u32) -> Result<ProcessIdentity, OsError> {
        let mut system = self.system.lock();
        let target = [Pid::from_u32(pid)];
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&target),
            true,
            Self::refresh_kind(),
        );

        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(OsError::ProcessVanished { pid })?;

        Ok(ProcessIdentity {
            name: process.name().to_string_lossy().into_owned(),
            bin_path: process
                .exe()
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default(),
            argv: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        })
    }

    fn attributes(&self, pid: u32) -> Result<LiveAttributes, OsError> {
        let nice = get_nice(pid).map_err(|e| errno_to_os_error(pid, "read priority", e))?;

        // Unreadable I/O priority or affinity leaves the value unknown; the
        // setter reports the real error if a rule needs it
        let io_priority = get_ioprio(pid)
            .ok()
            .and_then(|value| ioprio_to_io_priority(value, nice));
        let affinity = match get_affinity(pid) {
            Ok(cores) => cores,
            Err(Errno::ESRCH) => return Err(OsError::ProcessVanished { pid }),
            Err(_) => Vec::new(),
        };

        Ok(LiveAttributes {
            priority: nice_to_priority(nice),
            io_priority,
            affinity,
        })
    }

    fn services(&self) -> Result<Vec<ServiceSnapshot>, OsError> {
        self.services.lock().get_or_try_insert_with((), list_services)
    }

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OsError> {
        let nice = priority_to_nice(priority);
        Self::for_each_thread(pid, "set priority", |tid| set_nice(tid, nice))
    }

    fn set_io_priority(&self, pid: u32, io_priority: IoPriority) -> Result<(), OsError> {
        let value = io_priority_to_ioprio(io_priority);
        Self::for_each_thread(pid, "set I/O priority", |tid| set_ioprio(tid, value))
    }

    fn set_affinity(&self, pid: u32, cores: &[usize]) -> Result<(), OsError> {
        let mut set = CpuSet::new();
        for core in cores {
            set.set(*core).map_err(|_| OsError::Call {
                pid,
                operation: "set affinity",
                details: format!("core {} is out of range", core),
            })?;
        }

        Self::for_each_thread(pid, "set affinity", |tid| {
            sched_setaffinity(nix_pid(tid), &set)
        })
    }

    fn online_cores(&self) -> Vec<usize> {
        self.online_cores.clone()
    }

    fn is_elevated(&self) -> bool {
        geteuid().is_root()
    }
}
