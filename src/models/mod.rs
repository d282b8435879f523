//! Data models module
//!
//! Defines core data structures:
//! - Priority / IoPriority: OS scheduling and disk-bandwidth tiers a rule can request
//! - SelectorBy / ForceFlag: how a rule is matched and how often it is enforced
//! - ProcessSnapshot / ServiceSnapshot: one enumeration pass worth of OS state
//! - ProcessKey: identity used by the failure memo and deferred tasks

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[cfg(test)]
mod tests;

/// Process priority class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

impl Priority {
    pub const ALL: [Priority; 6] = [
        Priority::Idle,
        Priority::BelowNormal,
        Priority::Normal,
        Priority::AboveNormal,
        Priority::High,
        Priority::Realtime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Idle => "Idle",
            Priority::BelowNormal => "BelowNormal",
            Priority::Normal => "Normal",
            Priority::AboveNormal => "AboveNormal",
            Priority::High => "High",
            Priority::Realtime => "Realtime",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// I/O priority class
///
/// `High` is still accepted when reading old rule files; migration 3 strips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoPriority {
    VeryLow,
    Low,
    Normal,
    High,
}

impl IoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoPriority::VeryLow => "VeryLow",
            IoPriority::Low => "Low",
            IoPriority::Normal => "Normal",
            IoPriority::High => "High",
        }
    }
}

impl fmt::Display for IoPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which attribute of a process or service a rule's selector is compared with.
///
/// Unknown values survive deserialization so the matcher can report them
/// per process instead of rejecting the whole rule file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SelectorBy {
    #[default]
    Name,
    Path,
    CommandLine,
    Unknown(String),
}

impl SelectorBy {
    pub fn as_str(&self) -> &str {
        match self {
            SelectorBy::Name => "Name",
            SelectorBy::Path => "Path",
            SelectorBy::CommandLine => "CommandLine",
            SelectorBy::Unknown(other) => other,
        }
    }
}

impl From<&str> for SelectorBy {
    fn from(value: &str) -> Self {
        match value {
            "Name" => SelectorBy::Name,
            "Path" => SelectorBy::Path,
            "CommandLine" => SelectorBy::CommandLine,
            other => SelectorBy::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SelectorBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SelectorBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SelectorBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SelectorBy::from(raw.as_str()))
    }
}

/// Whether a rule is re-enforced every cycle (`Y`) or applied once when the
/// process is first observed (`N`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForceFlag {
    #[serde(rename = "Y")]
    Yes,
    #[default]
    #[serde(rename = "N")]
    No,
}

impl ForceFlag {
    pub fn is_forced(&self) -> bool {
        matches!(self, ForceFlag::Yes)
    }
}

/// Process attribute a rule can change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AttributeKind {
    Affinity,
    Priority,
    IoPriority,
}

impl AttributeKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::Affinity => "affinity",
            AttributeKind::Priority => "priority",
            AttributeKind::IoPriority => "I/O priority",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable facts about a process, read once per process lifetime
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessIdentity {
    pub name: String,
    /// Empty when the executable path cannot be read
    pub bin_path: String,
    pub argv: Vec<String>,
}

/// Attributes a rule may change; re-read on every enumeration pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveAttributes {
    pub priority: Option<Priority>,
    pub io_priority: Option<IoPriority>,
    pub affinity: Vec<usize>,
}

/// A running service, associated to its process by pid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub pid: u32,
    pub name: String,
    pub display_name: String,
    pub status: String,
    pub bin_path: String,
    pub cmd_line: String,
}

impl ServiceSnapshot {
    /// Stopped services and services without a main process are never associated
    pub fn is_running(&self) -> bool {
        self.pid != 0 && !self.status.eq_ignore_ascii_case("stopped")
    }
}

/// One process as seen by the latest enumeration pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub bin_path: String,
    pub cmd_line: String,
    pub priority: Option<Priority>,
    pub io_priority: Option<IoPriority>,
    pub affinity: Vec<usize>,
    pub service: Option<ServiceSnapshot>,
    /// True on the pass where this pid (or a reused pid) was first observed
    pub is_new: bool,
}

impl ProcessSnapshot {
    pub fn key(&self) -> ProcessKey {
        ProcessKey::new(self.pid, &self.name)
    }

    pub fn refresh(&mut self, attributes: LiveAttributes) {
        self.priority = attributes.priority;
        self.io_priority = attributes.io_priority;
        self.affinity = attributes.affinity;
        self.is_new = false;
    }
}

/// Identity of a process across passes: pid plus name, so a reused pid under
/// a different executable never inherits memoized state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessKey {
    pub pid: u32,
    pub name: String,
}

impl ProcessKey {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.pid)
    }
}
