//! Shared fixtures for integration tests
//!
//! Builds a governor over a temporary rule file and the in-memory process
//! control backend, so scenarios can be driven tick by tick.

#![allow(dead_code)]

pub mod logs;
pub mod notifier;
pub mod simulated;

pub use logs::{capture_logs, lines_at_least, take_logs};
pub use notifier::RecordingNotifier;
pub use simulated::{SetterCall, SimulatedControl};

use procgov::config::{Config, ConfigStore, Rule};
use procgov::models::Priority;
use procgov::monitor::Governor;
use procgov::scheduler::ManualClock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A governor with everything it talks to exposed for inspection
pub struct TestGovernor {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub control: Arc<SimulatedControl>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub governor: Governor,
}

impl TestGovernor {
    pub fn new(config: &Config) -> Self {
        Self::with_control(config, SimulatedControl::new())
    }

    pub fn with_control(config: &Config, control: SimulatedControl) -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let config_path = temp_dir.path().join("config.json");
        write_config(&config_path, config);

        let control = Arc::new(control);
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new());
        let governor = Governor::new(
            ConfigStore::new(&config_path),
            control.clone(),
            notifier.clone(),
            clock.clone(),
        );

        Self {
            temp_dir,
            config_path,
            control,
            notifier,
            clock,
            governor,
        }
    }

    /// Run ticks, failing the test on any loop error
    pub fn tick(&mut self, count: usize) {
        for _ in 0..count {
            self.governor.tick().expect("tick");
        }
    }

    /// Replace the rule file so the next tick sees a new modification time
    pub fn rewrite_config(&self, config: &Config) {
        std::thread::sleep(Duration::from_millis(50));
        write_config(&self.config_path, config);
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}

pub fn write_config(path: &Path, config: &Config) {
    ConfigStore::new(path).save(config).expect("write config");
}

/// A rule set with one process rule
pub fn single_rule(rule: Rule) -> Config {
    let mut config = Config::default();
    config.process_rules.push(rule);
    config
}

pub fn priority_rule(selector: &str, priority: Priority) -> Rule {
    let mut rule = Rule::new(selector);
    rule.priority = Some(priority);
    rule
}
