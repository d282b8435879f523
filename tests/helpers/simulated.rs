//! In-memory process table
//!
//! Behaves like a small OS: setters change the stored attributes, removed
//! processes report `ProcessVanished`, and individual attributes can be
//! denied per pid. Every setter call is recorded, successful or not.

use parking_lot::Mutex;
use procgov::error::OsError;
use procgov::models::{
    AttributeKind, IoPriority, LiveAttributes, Priority, ProcessIdentity, ServiceSnapshot,
};
use procgov::platform::ProcessControl;
use std::collections::{BTreeMap, HashSet};

/// One recorded setter invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetterCall {
    Priority(u32, Priority),
    IoPriority(u32, IoPriority),
    Affinity(u32, Vec<usize>),
}

impl SetterCall {
    pub fn pid(&self) -> u32 {
        match self {
            SetterCall::Priority(pid, _)
            | SetterCall::IoPriority(pid, _)
            | SetterCall::Affinity(pid, _) => *pid,
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedProcess {
    identity: ProcessIdentity,
    attributes: LiveAttributes,
}

#[derive(Debug)]
struct State {
    processes: BTreeMap<u32, SimulatedProcess>,
    services: Vec<ServiceSnapshot>,
    denied: HashSet<(u32, AttributeKind)>,
    calls: Vec<SetterCall>,
    online_cores: Vec<usize>,
    elevated: bool,
    own_pid: u32,
}

#[derive(Debug)]
pub struct SimulatedControl {
    state: Mutex<State>,
}

impl Default for SimulatedControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedControl {
    /// Empty table on four online cores, elevated, with a governor pid no
    /// test process uses
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                processes: BTreeMap::new(),
                services: Vec::new(),
                denied: HashSet::new(),
                calls: Vec::new(),
                online_cores: vec![0, 1, 2, 3],
                elevated: true,
                own_pid: u32::MAX,
            }),
        }
    }

    /// Attributes a freshly added process starts with
    pub fn default_attributes() -> LiveAttributes {
        LiveAttributes {
            priority: Some(Priority::Normal),
            io_priority: Some(IoPriority::Normal),
            affinity: vec![0, 1, 2, 3],
        }
    }

    /// Add or replace the process at `pid`
    pub fn add_process(&self, pid: u32, name: &str, bin_path: &str, argv: &[&str]) {
        let process = SimulatedProcess {
            identity: ProcessIdentity {
                name: name.to_string(),
                bin_path: bin_path.to_string(),
                argv: argv.iter().map(|arg| arg.to_string()).collect(),
            },
            attributes: Self::default_attributes(),
        };
        self.state.lock().processes.insert(pid, process);
    }

    pub fn remove_process(&self, pid: u32) {
        self.state.lock().processes.remove(&pid);
    }

    pub fn set_attributes(&self, pid: u32, attributes: LiveAttributes) {
        if let Some(process) = self.state.lock().processes.get_mut(&pid) {
            process.attributes = attributes;
        }
    }

    pub fn attributes_of(&self, pid: u32) -> Option<LiveAttributes> {
        self.state
            .lock()
            .processes
            .get(&pid)
            .map(|process| process.attributes.clone())
    }

    pub fn add_service(&self, service: ServiceSnapshot) {
        self.state.lock().services.push(service);
    }

    /// Make setting `kind` on `pid` fail with permission denied
    pub fn deny(&self, pid: u32, kind: AttributeKind) {
        self.state.lock().denied.insert((pid, kind));
    }

    pub fn set_elevated(&self, elevated: bool) {
        self.state.lock().elevated = elevated;
    }

    pub fn set_own_pid(&self, pid: u32) {
        self.state.lock().own_pid = pid;
    }

    pub fn set_online_cores(&self, cores: Vec<usize>) {
        self.state.lock().online_cores = cores;
    }

    pub fn calls(&self) -> Vec<SetterCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, pid: u32) -> Vec<SetterCall> {
        self.calls().into_iter().filter(|call| call.pid() == pid).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn apply(
        &self,
        call: SetterCall,
        kind: AttributeKind,
        operation: &'static str,
        update: impl FnOnce(&mut LiveAttributes),
    ) -> Result<(), OsError> {
        let mut state = self.state.lock();
        let pid = call.pid();
        state.calls.push(call);

        if state.denied.contains(&(pid, kind)) {
            return Err(OsError::PermissionDenied { pid, operation });
        }

        let process = state
            .processes
            .get_mut(&pid)
            .ok_or(OsError::ProcessVanished { pid })?;
        update(&mut process.attributes);
        Ok(())
    }
}

impl ProcessControl for SimulatedControl {
    fn pids(&self) -> Result<Vec<u32>, OsError> {
        Ok(self.state.lock().processes.keys().copied().collect())
    }

    fn bin_path(&self, pid: u32) -> Result<String, OsError> {
        self.state
            .lock()
            .processes
            .get(&pid)
            .map(|process| process.identity.bin_path.clone())
            .ok_or(OsError::ProcessVanished { pid })
    }

    fn identity(&self, pid: u32) -> Result<ProcessIdentity, OsError> {
        self.state
            .lock()
            .processes
            .get(&pid)
            .map(|process| process.identity.clone())
            .ok_or(OsError::ProcessVanished { pid })
    }

    fn attributes(&self, pid: u32) -> Result<LiveAttributes, OsError> {
        self.attributes_of(pid)
            .ok_or(OsError::ProcessVanished { pid })
    }

    fn services(&self) -> Result<Vec<ServiceSnapshot>, OsError> {
        Ok(self.state.lock().services.clone())
    }

    fn set_priority(&self, pid: u32, priority: Priority) -> Result<(), OsError> {
        self.apply(
            SetterCall::Priority(pid, priority),
            AttributeKind::Priority,
            "set priority",
            |attributes| attributes.priority = Some(priority),
        )
    }

    fn set_io_priority(&self, pid: u32, io_priority: IoPriority) -> Result<(), OsError> {
        self.apply(
            SetterCall::IoPriority(pid, io_priority),
            AttributeKind::IoPriority,
            "set I/O priority",
            |attributes| attributes.io_priority = Some(io_priority),
        )
    }

    fn set_affinity(&self, pid: u32, cores: &[usize]) -> Result<(), OsError> {
        let cores = cores.to_vec();
        self.apply(
            SetterCall::Affinity(pid, cores.clone()),
            AttributeKind::Affinity,
            "set affinity",
            move |attributes| attributes.affinity = cores,
        )
    }

    fn online_cores(&self) -> Vec<usize> {
        self.state.lock().online_cores.clone()
    }

    fn is_elevated(&self) -> bool {
        self.state.lock().elevated
    }

    fn current_pid(&self) -> u32 {
        self.state.lock().own_pid
    }
}
