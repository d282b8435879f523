//! Rule file model
//!
//! Handles the typed view of the JSON rule file, its validation, and the
//! per-rule error report consumed by `procgov check` and the main loop's
//! notification branch.

pub mod affinity;
pub mod migration;
pub mod store;

use crate::constants::{CURRENT_CONFIG_VERSION, DEFAULT_RULE_APPLY_INTERVAL_SECS};
use crate::error::ConfigError;
use crate::models::{ForceFlag, IoPriority, Priority, SelectorBy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub use store::ConfigStore;

/// Which rule list a rule lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleKind {
    Process,
    Service,
}

impl RuleKind {
    pub const ALL: [RuleKind; 2] = [RuleKind::Process, RuleKind::Service];

    /// Key of the rule list in the JSON document
    pub fn field(&self) -> &'static str {
        match self {
            RuleKind::Process => "processRules",
            RuleKind::Service => "serviceRules",
        }
    }
}

/// One entry of `processRules` or `serviceRules`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub selector_by: SelectorBy,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_priority: Option<IoPriority>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "affinity::deserialize"
    )]
    pub affinity: Option<Vec<usize>>,
    #[serde(default)]
    pub force: ForceFlag,
    /// Seconds to wait after a match before applying
    #[serde(default)]
    pub delay: u64,
}

impl Rule {
    /// Minimal rule matching `selector` by name with nothing to apply
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector_by: SelectorBy::Name,
            selector: selector.into(),
            priority: None,
            io_priority: None,
            affinity: None,
            force: ForceFlag::No,
            delay: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.selector.trim().is_empty() {
            return Err("selector must not be empty".to_string());
        }
        Ok(())
    }
}

/// The whole rule file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default = "default_interval")]
    pub rule_apply_interval_seconds: u64,
    #[serde(default)]
    pub process_rules: Vec<Rule>,
    #[serde(default)]
    pub service_rules: Vec<Rule>,
}

fn default_interval() -> u64 {
    DEFAULT_RULE_APPLY_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: Some(CURRENT_CONFIG_VERSION),
            rule_apply_interval_seconds: DEFAULT_RULE_APPLY_INTERVAL_SECS,
            process_rules: Vec::new(),
            service_rules: Vec::new(),
        }
    }
}

impl Config {
    /// Parse and validate a JSON document
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(value)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rule_apply_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "ruleApplyIntervalSeconds must be at least 1".to_string(),
            ));
        }

        for kind in RuleKind::ALL {
            for (index, rule) in self.rules(kind).iter().enumerate() {
                rule.validate().map_err(|reason| ConfigError::InvalidRule {
                    section: kind.field(),
                    index,
                    reason,
                })?;
            }
        }

        Ok(())
    }

    pub fn rules(&self, kind: RuleKind) -> &[Rule] {
        match kind {
            RuleKind::Process => &self.process_rules,
            RuleKind::Service => &self.service_rules,
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.process_rules.is_empty() || !self.service_rules.is_empty()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.rule_apply_interval_seconds.max(1))
    }
}

/// Validate each raw rule independently and describe every failure.
///
/// Used where one bad rule must not hide the others, unlike `Config::from_value`
/// which stops at the first error.
pub fn rule_errors(raw: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    for kind in RuleKind::ALL {
        let Some(rules) = raw.get(kind.field()) else {
            continue;
        };

        let Some(rules) = rules.as_array() else {
            errors.push(format!("{}: expected a list of rules", kind.field()));
            continue;
        };

        for (index, rule) in rules.iter().enumerate() {
            let result = serde_json::from_value::<Rule>(rule.clone())
                .map_err(|e| e.to_string())
                .and_then(|rule| rule.validate());

            if let Err(reason) = result {
                errors.push(format!("{}[{}]: {}", kind.field(), index, reason));
            }
        }
    }

    errors
}
