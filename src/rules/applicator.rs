//! Applying a matched rule to a process
//!
//! Attributes are handled in a fixed order (affinity, priority, I/O priority)
//! and each one independently: an attribute already at its target is left
//! alone, a denied one is remembered per process identity so it is not
//! retried, and a process that exits halfway through is ignored.

use crate::config::affinity::format_affinity;
use crate::config::Rule;
use crate::constants::FAILURE_MEMO_GC_INTERVAL_SECS;
use crate::error::OsError;
use crate::models::{AttributeKind, IoPriority, ProcessKey, ProcessSnapshot};
use crate::platform::ProcessControl;
use crate::scheduler::{Clock, DeferredTasks, RateGate};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Attribute kinds the OS refused, per process identity
#[derive(Debug, Default)]
pub struct FailureMemo {
    entries: HashMap<ProcessKey, BTreeSet<AttributeKind>>,
}

impl FailureMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ProcessKey, kind: AttributeKind) -> bool {
        self.entries
            .get(key)
            .is_some_and(|kinds| kinds.contains(&kind))
    }

    /// Kinds to skip for `key`
    pub fn denied(&self, key: &ProcessKey) -> BTreeSet<AttributeKind> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn record(&mut self, key: ProcessKey, kind: AttributeKind) {
        self.entries.entry(key).or_default().insert(kind);
    }

    /// Drop entries whose pid is not in `live`
    pub fn retain_live(&mut self, live: &HashSet<u32>) {
        self.entries.retain(|key, _| live.contains(&key.pid));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What one application attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub key: ProcessKey,
    /// Attributes changed, with the value set
    pub applied: Vec<(AttributeKind, String)>,
    pub denied: Vec<AttributeKind>,
    /// The process exited before or during application
    pub vanished: bool,
    pub failed: Vec<(AttributeKind, String)>,
}

impl ApplyOutcome {
    fn new(key: ProcessKey) -> Self {
        Self {
            key,
            applied: Vec::new(),
            denied: Vec::new(),
            vanished: false,
            failed: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.denied.is_empty() && self.failed.is_empty()
    }
}

/// A pending OS call for one attribute
enum Change {
    Affinity(Vec<usize>),
    Priority(crate::models::Priority),
    IoPriority(IoPriority),
}

impl Change {
    fn kind(&self) -> AttributeKind {
        match self {
            Change::Affinity(_) => AttributeKind::Affinity,
            Change::Priority(_) => AttributeKind::Priority,
            Change::IoPriority(_) => AttributeKind::IoPriority,
        }
    }

    fn value(&self) -> String {
        match self {
            Change::Affinity(cores) => format_affinity(cores),
            Change::Priority(priority) => priority.to_string(),
            Change::IoPriority(io_priority) => io_priority.to_string(),
        }
    }

    fn call(&self, control: &dyn ProcessControl, pid: u32) -> Result<(), OsError> {
        match self {
            Change::Affinity(cores) => control.set_affinity(pid, cores),
            Change::Priority(priority) => control.set_priority(pid, *priority),
            Change::IoPriority(io_priority) => control.set_io_priority(pid, *io_priority),
        }
    }
}

/// Cores of `requested` the scheduler can use. Offline or nonexistent cores
/// never read back, so they are dropped before comparing.
fn effective_affinity(requested: &[usize], online: &[usize]) -> Vec<usize> {
    requested
        .iter()
        .copied()
        .filter(|core| online.contains(core))
        .collect()
}

/// Changes `rule` asks for that `process` does not already have
fn pending_changes(
    control: &dyn ProcessControl,
    rule: &Rule,
    process: &ProcessSnapshot,
) -> Vec<Change> {
    let mut changes = Vec::new();

    if let Some(requested) = rule.affinity.as_deref().filter(|c| !c.is_empty()) {
        let cores = effective_affinity(requested, &control.online_cores());
        if cores.is_empty() {
            debug!(
                "No requested core of `{}` is online for {}",
                format_affinity(requested),
                process.key()
            );
        } else if process.affinity != cores {
            changes.push(Change::Affinity(cores));
        }
    }

    if let Some(priority) = rule.priority {
        if process.priority != Some(priority) {
            changes.push(Change::Priority(priority));
        }
    }

    // `High` only survives in unmigrated files and is never applied
    if let Some(io_priority) = rule.io_priority.filter(|p| *p != IoPriority::High) {
        if process.io_priority != Some(io_priority) {
            changes.push(Change::IoPriority(io_priority));
        }
    }

    changes
}

/// Apply `rule` to `process`, skipping the kinds in `skip`
pub fn apply_rule(
    control: &dyn ProcessControl,
    rule: &Rule,
    process: &ProcessSnapshot,
    skip: &BTreeSet<AttributeKind>,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::new(process.key());

    for change in pending_changes(control, rule, process) {
        let kind = change.kind();
        if skip.contains(&kind) {
            continue;
        }

        match change.call(control, process.pid) {
            Ok(()) => {
                let value = change.value();
                info!(
                    "Set {} `{}` for {} ({}).",
                    kind, value, process.name, process.pid
                );
                outcome.applied.push((kind, value));
            }
            Err(e) if e.is_vanished() => {
                debug!("{} ({}) exited before {} was set", process.name, process.pid, kind);
                outcome.vanished = true;
                break;
            }
            Err(e) if e.is_permission_denied() => outcome.denied.push(kind),
            Err(e) => {
                error!("Failed to set {} for {} ({}): {}", kind, process.name, process.pid, e);
                outcome.failed.push((kind, e.to_string()));
            }
        }
    }

    if !outcome.denied.is_empty() {
        let kinds: Vec<&str> = outcome.denied.iter().map(AttributeKind::label).collect();
        warn!(
            "Failed to set {} for {} ({}).",
            kinds.join(", "),
            process.name,
            process.pid
        );
    }

    outcome
}

/// Whether a matched rule should be applied on this cycle.
///
/// Forced rules apply every cycle. Others apply to newly observed processes,
/// and to everything on a full-refresh cycle.
pub fn should_apply(rule: &Rule, process: &ProcessSnapshot, full_refresh: bool) -> bool {
    rule.force.is_forced() || process.is_new || full_refresh
}

/// Applies rules and owns the failure memo
pub struct RuleApplicator {
    control: Arc<dyn ProcessControl>,
    memo: FailureMemo,
    deferred: DeferredTasks<ProcessKey>,
    outcomes_tx: Sender<ApplyOutcome>,
    outcomes_rx: Receiver<ApplyOutcome>,
    gc_gate: RateGate,
    elevated: bool,
}

impl RuleApplicator {
    pub fn new(control: Arc<dyn ProcessControl>, clock: Arc<dyn Clock>) -> Self {
        let (outcomes_tx, outcomes_rx) = unbounded();
        let elevated = control.is_elevated();

        Self {
            control,
            memo: FailureMemo::new(),
            deferred: DeferredTasks::new(),
            outcomes_tx,
            outcomes_rx,
            gc_gate: RateGate::new(Duration::from_secs(FAILURE_MEMO_GC_INTERVAL_SECS), clock),
            elevated,
        }
    }

    pub fn memo(&self) -> &FailureMemo {
        &self.memo
    }

    pub fn deferred(&self) -> &DeferredTasks<ProcessKey> {
        &self.deferred
    }

    /// Apply now, or schedule when the rule has a delay
    pub fn handle(&mut self, rule: &Rule, process: &ProcessSnapshot) {
        let key = process.key();
        let skip = self.memo.denied(&key);

        if rule.delay == 0 {
            let outcome = apply_rule(self.control.as_ref(), rule, process, &skip);
            self.record(outcome);
            return;
        }

        let delay = rule.delay();
        let control = Arc::clone(&self.control);
        let rule = rule.clone();
        let expected = process.clone();
        let outcomes = self.outcomes_tx.clone();

        let scheduled = self.deferred.schedule(key.clone(), delay, move || {
            let Some(current) = reread(control.as_ref(), &expected) else {
                return;
            };
            let outcome = apply_rule(control.as_ref(), &rule, &current, &skip);
            // The loop may already be gone during shutdown
            let _ = outcomes.send(outcome);
        });

        if scheduled {
            debug!("Scheduled rule for {} in {}s", key, delay.as_secs());
        }
    }

    /// Fold results of finished deferred tasks into the memo
    pub fn drain_deferred_outcomes(&mut self) -> usize {
        let outcomes: Vec<ApplyOutcome> = self.outcomes_rx.try_iter().collect();
        let count = outcomes.len();
        for outcome in outcomes {
            self.record(outcome);
        }
        count
    }

    /// Prune memo entries of exited processes, at most once per interval
    pub fn collect_garbage(&mut self, live: &HashSet<u32>) -> bool {
        if !self.gc_gate.try_pass() {
            return false;
        }
        self.memo.retain_live(live);
        true
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        if !self.elevated {
            return;
        }
        for kind in outcome.denied {
            self.memo.record(outcome.key.clone(), kind);
        }
    }
}

/// Fresh snapshot of `expected`, or `None` when the pid now belongs to
/// something else or is gone
fn reread(control: &dyn ProcessControl, expected: &ProcessSnapshot) -> Option<ProcessSnapshot> {
    let identity = control.identity(expected.pid).ok()?;
    if identity.name != expected.name || identity.bin_path != expected.bin_path {
        debug!("{} was replaced before its delayed rule ran", expected.key());
        return None;
    }

    let attributes = control.attributes(expected.pid).ok()?;
    let mut current = expected.clone();
    current.refresh(attributes);
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForceFlag;

    fn process(is_new: bool) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: 10,
            name: "app".to_string(),
            bin_path: "/bin/app".to_string(),
            cmd_line: String::new(),
            priority: None,
            io_priority: None,
            affinity: vec![0, 1, 2, 3],
            service: None,
            is_new,
        }
    }

    #[test]
    fn test_effective_affinity_drops_offline_cores() {
        assert_eq!(effective_affinity(&[0, 2, 5, 9], &[0, 1, 2, 3, 4, 5]), vec![0, 2, 5]);
        assert!(effective_affinity(&[8, 9], &[0, 1]).is_empty());
    }

    #[test]
    fn test_should_apply_follows_force_and_freshness() {
        let mut rule = Rule::new("app");

        assert!(should_apply(&rule, &process(true), false));
        assert!(!should_apply(&rule, &process(false), false));
        assert!(should_apply(&rule, &process(false), true));

        rule.force = ForceFlag::Yes;
        assert!(should_apply(&rule, &process(false), false));
    }

    #[test]
    fn test_memo_tracks_kinds_per_identity() {
        let mut memo = FailureMemo::new();
        let key = ProcessKey::new(10, "app");
        memo.record(key.clone(), AttributeKind::Priority);

        assert!(memo.contains(&key, AttributeKind::Priority));
        assert!(!memo.contains(&ProcessKey::new(10, "other"), AttributeKind::Priority));

        memo.retain_live(&HashSet::new());
        assert!(memo.is_empty());
    }
}
