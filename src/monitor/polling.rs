//! The governor loop
//!
//! Every tick reloads the rule file when it changed, enumerates processes and
//! applies the first matching rule to each of them, then sleeps for what is
//! left of the interval. Errors never stop the loop: they are logged and
//! notified once per distinct message, and a broken rule file is replaced by
//! the default (empty) rule set until it loads again.

use crate::config::{Config, ConfigStore};
use crate::constants::SHUTDOWN_POLL_MILLIS;
use crate::daemon::logging::GovernorLogger;
use crate::daemon::notify::{Notification, Notifier};
use crate::error::EngineError;
use crate::monitor::ProcessTracker;
use crate::platform::ProcessControl;
use crate::rules::{should_apply, RuleApplicator, RuleMatcher};
use crate::scheduler::Clock;
use log::debug;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Polling,
    Applying,
    Sleeping,
    Stopped,
}

/// Counters for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub config_changed: bool,
    pub processes: usize,
    pub matched: usize,
    pub handled: usize,
}

/// Reconciles the rule file against live processes
pub struct Governor {
    store: ConfigStore,
    control: Arc<dyn ProcessControl>,
    notifier: Arc<dyn Notifier>,
    logger: GovernorLogger,
    tracker: ProcessTracker,
    matcher: RuleMatcher,
    applicator: RuleApplicator,
    config: Option<Config>,
    last_error: Option<String>,
    state: LoopState,
    ignored_pids: HashSet<u32>,
}

impl Governor {
    pub fn new(
        store: ConfigStore,
        control: Arc<dyn ProcessControl>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ignored_pids = HashSet::from([0, control.current_pid()]);
        let applicator = RuleApplicator::new(Arc::clone(&control), clock);

        Self {
            store,
            control,
            notifier,
            logger: GovernorLogger::new(),
            tracker: ProcessTracker::new(),
            matcher: RuleMatcher::new(),
            applicator,
            config: None,
            last_error: None,
            state: LoopState::Idle,
            ignored_pids,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Rules currently in force
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn applicator(&self) -> &RuleApplicator {
        &self.applicator
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// One reload, enumerate and apply pass
    pub fn tick(&mut self) -> Result<TickReport, EngineError> {
        let mut report = TickReport::default();
        self.applicator.drain_deferred_outcomes();

        let had_config = self.config.is_some();
        let (config, changed) = self.store.reload_if_changed(self.config.take())?;
        report.config_changed = changed;

        if changed {
            self.matcher.reset_reports();
            if had_config {
                self.logger.log_config_change(
                    self.store.path(),
                    config.process_rules.len(),
                    config.service_rules.len(),
                );
            }
        }

        let result = self.reconcile(&config, changed, &mut report);
        self.config = Some(config);
        result.map(|()| report)
    }

    fn reconcile(
        &mut self,
        config: &Config,
        full_refresh: bool,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        if !config.has_rules() {
            return Ok(());
        }

        self.state = LoopState::Polling;
        let snapshots = self.tracker.update(self.control.as_ref())?;
        report.processes = snapshots.len();

        let live: HashSet<u32> = snapshots.keys().copied().collect();
        if self.applicator.collect_garbage(&live) {
            debug!("Pruned failure memo, {} entries left", self.applicator.memo().len());
        }

        self.state = LoopState::Applying;
        let mut pids: Vec<u32> = snapshots.keys().copied().collect();
        pids.sort_unstable();

        for pid in pids {
            if self.ignored_pids.contains(&pid) {
                continue;
            }
            let process = &snapshots[&pid];

            let Some(found) = self.matcher.resolve(config, process) else {
                continue;
            };
            report.matched += 1;

            if should_apply(found.rule, process, full_refresh) {
                self.applicator.handle(found.rule, process);
                report.handled += 1;
            }
        }

        Ok(())
    }

    /// Tick, absorbing any error. Returns whether the tick succeeded.
    pub fn run_cycle(&mut self) -> bool {
        match self.tick() {
            Ok(_) => {
                self.last_error = None;
                true
            }
            Err(e) => {
                self.handle_error(e);
                false
            }
        }
    }

    fn handle_error(&mut self, error: EngineError) {
        if self.config.is_none() {
            self.config = Some(Config::default());
        }

        let message = error.to_string();
        if self.last_error.as_deref() == Some(message.as_str()) {
            return;
        }

        self.logger
            .log_error("Error in the loop of loading and applying rules.", Some(message.as_str()));

        let notification = if self.store.rules_have_errors() {
            Notification::RulesInvalid {
                message: message.clone(),
            }
        } else {
            Notification::EngineFailure {
                message: message.clone(),
                fatal: false,
            }
        };
        self.notifier.notify(notification);
        self.last_error = Some(message);
    }

    fn interval(&self) -> Duration {
        self.config
            .as_ref()
            .map(Config::interval)
            .unwrap_or_else(|| Config::default().interval())
    }

    /// Loop until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.run_cycle();

            self.state = LoopState::Sleeping;
            let remaining = self.interval().saturating_sub(started.elapsed());
            sleep_while_running(remaining, running);
        }

        self.state = LoopState::Stopped;
    }
}

/// Sleep for `duration` in short slices, returning early once `running` is
/// cleared
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + duration;
    let slice = Duration::from_millis(SHUTDOWN_POLL_MILLIS);

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(slice.min(deadline - now));
    }
}
