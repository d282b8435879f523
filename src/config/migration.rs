//! Versioned upgrades of the raw rule file
//!
//! Each migration is a pure function over the untyped JSON document. The
//! chain runs once at startup: back up the file, apply every migration whose
//! precondition holds on the current intermediate document, stamp the target
//! version after each, and write the result only if every step succeeded.

use super::store::ConfigStore;
use crate::error::MigrationError;
use log::{error, info};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One schema upgrade step
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;

    /// Version stamped on the document after `migrate` succeeds
    fn target_version(&self) -> u64;

    fn should_migrate(&self, config: &Value) -> bool;

    fn migrate(&self, config: Value) -> Result<Value, MigrationError>;
}

/// Migrations in the order they must run
pub fn all_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(SplitRules),
        Box::new(NewRuleFields),
        Box::new(RemoveHighIoPriorityAndLogging),
    ]
}

/// What a migration run did
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Name and target version of every applied step
    pub applied: Vec<(&'static str, u64)>,
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Apply `migrations` to `config` in order, without touching the disk
pub fn migrate_value(
    mut config: Value,
    migrations: &[Box<dyn Migration>],
) -> Result<(Value, Vec<(&'static str, u64)>), MigrationError> {
    let mut applied = Vec::new();

    for migration in migrations {
        if !migration.should_migrate(&config) {
            continue;
        }

        let name = migration.name();
        info!("[{}] Starting migration...", name);

        let mut migrated = migration.migrate(config.clone())?;
        let version = migration.target_version();
        object_mut(name, &mut migrated)?.insert("version".to_string(), Value::from(version));

        info!("[{}] Migration completed to version {}.", name, version);
        applied.push((name, version));
        config = migrated;
    }

    Ok((config, applied))
}

/// Migrate the store's rule file in place
pub fn run_all_migrations(
    store: &ConfigStore,
    migrations: &[Box<dyn Migration>],
) -> Result<MigrationReport, MigrationError> {
    let config = store.load_raw()?;

    if !migrations.iter().any(|m| m.should_migrate(&config)) {
        return Ok(MigrationReport::default());
    }

    info!("Creating backup of the current configuration before migration...");
    let backup = store.backup()?;

    let (migrated, applied) = migrate_value(config, migrations).map_err(|e| {
        error!("{}", e);
        e
    })?;

    store.save_raw(&migrated)?;

    Ok(MigrationReport { applied, backup })
}

fn object_mut<'a>(
    name: &'static str,
    config: &'a mut Value,
) -> Result<&'a mut Map<String, Value>, MigrationError> {
    config
        .as_object_mut()
        .ok_or_else(|| MigrationError::step(name, "configuration root is not a JSON object"))
}

fn version_of(config: &Value) -> Option<u64> {
    config.get("version").and_then(Value::as_u64)
}

/// Rule lists present in the document, process rules first
fn rule_lists_mut(config: &mut Map<String, Value>) -> impl Iterator<Item = &mut Value> {
    config
        .iter_mut()
        .filter(|(key, _)| key.as_str() == "processRules" || key.as_str() == "serviceRules")
        .filter_map(|(_, rules)| rules.as_array_mut())
        .flat_map(|rules| rules.iter_mut())
}

/// Version 1: a single `rules` list split into process and service rules
pub struct SplitRules;

impl Migration for SplitRules {
    fn name(&self) -> &'static str {
        "SplitRules"
    }

    fn target_version(&self) -> u64 {
        1
    }

    fn should_migrate(&self, config: &Value) -> bool {
        config.get("version").map_or(true, Value::is_null)
    }

    fn migrate(&self, mut config: Value) -> Result<Value, MigrationError> {
        let root = object_mut(self.name(), &mut config)?;

        let Some(rules) = root.remove("rules") else {
            return Ok(config);
        };

        let Value::Array(rules) = rules else {
            return Err(MigrationError::step(self.name(), "`rules` is not a list"));
        };

        let mut process_rules = Vec::new();
        let mut service_rules = Vec::new();

        for rule in rules {
            let Value::Object(mut rule) = rule else {
                return Err(MigrationError::step(self.name(), "rule is not an object"));
            };

            if let Some(selector) = rule.remove("processSelector") {
                rule.insert("selector".to_string(), selector);
                process_rules.push(Value::Object(rule));
            } else if let Some(selector) = rule.remove("serviceSelector") {
                rule.insert("selector".to_string(), selector);
                service_rules.push(Value::Object(rule));
            }
        }

        root.insert("processRules".to_string(), Value::Array(process_rules));
        root.insert("serviceRules".to_string(), Value::Array(service_rules));

        Ok(config)
    }
}

/// Version 2: explicit `selectorBy` on process rules and `force` on every rule
pub struct NewRuleFields;

impl Migration for NewRuleFields {
    fn name(&self) -> &'static str {
        "NewRuleFields"
    }

    fn target_version(&self) -> u64 {
        2
    }

    fn should_migrate(&self, config: &Value) -> bool {
        version_of(config) == Some(1)
    }

    fn migrate(&self, mut config: Value) -> Result<Value, MigrationError> {
        let root = object_mut(self.name(), &mut config)?;

        if let Some(rules) = root.get_mut("processRules").and_then(Value::as_array_mut) {
            for rule in rules.iter_mut().filter_map(Value::as_object_mut) {
                rule.insert("selectorBy".to_string(), Value::from("Name"));
            }
        }

        for rule in rule_lists_mut(root).filter_map(Value::as_object_mut) {
            rule.insert("force".to_string(), Value::from("N"));
        }

        Ok(config)
    }
}

/// Version 3: the `High` I/O priority and the embedded logging block are gone
pub struct RemoveHighIoPriorityAndLogging;

impl Migration for RemoveHighIoPriorityAndLogging {
    fn name(&self) -> &'static str {
        "RemoveHighIoPriorityAndLogging"
    }

    fn target_version(&self) -> u64 {
        3
    }

    fn should_migrate(&self, config: &Value) -> bool {
        version_of(config) == Some(2)
    }

    fn migrate(&self, mut config: Value) -> Result<Value, MigrationError> {
        let root = object_mut(self.name(), &mut config)?;

        for rule in rule_lists_mut(root).filter_map(Value::as_object_mut) {
            if rule.get("ioPriority").and_then(Value::as_str) == Some("High") {
                rule.remove("ioPriority");
            }
        }

        root.remove("logging");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_chain_from_unversioned() {
        let input = json!({"rules": [{"processSelector": "a.exe", "priority": "High"}]});

        let (output, applied) = migrate_value(input, &all_migrations()).unwrap();

        assert_eq!(
            output,
            json!({
                "version": 3,
                "processRules": [
                    {"selector": "a.exe", "selectorBy": "Name", "force": "N", "priority": "High"}
                ],
                "serviceRules": []
            })
        );
        assert_eq!(
            applied,
            vec![
                ("SplitRules", 1),
                ("NewRuleFields", 2),
                ("RemoveHighIoPriorityAndLogging", 3)
            ]
        );
    }

    #[test]
    fn test_split_rules_by_selector_key() {
        let input = json!({"rules": [
            {"processSelector": "a.exe"},
            {"serviceSelector": "Spooler", "priority": "Idle"},
        ]});

        let output = SplitRules.migrate(input).unwrap();
        assert_eq!(output["processRules"], json!([{"selector": "a.exe"}]));
        assert_eq!(
            output["serviceRules"],
            json!([{"selector": "Spooler", "priority": "Idle"}])
        );
        assert!(output.get("rules").is_none());
    }

    #[test]
    fn test_split_rules_without_rules_passes_through() {
        let input = json!({"ruleApplyIntervalSeconds": 2});
        assert_eq!(SplitRules.migrate(input.clone()).unwrap(), input);
    }

    #[test]
    fn test_service_rules_only_gain_force() {
        let input = json!({"version": 1, "serviceRules": [{"selector": "Spooler"}]});
        let output = NewRuleFields.migrate(input).unwrap();
        assert_eq!(output["serviceRules"], json!([{"selector": "Spooler", "force": "N"}]));
    }

    #[test]
    fn test_high_io_priority_and_logging_removed() {
        let input = json!({
            "version": 2,
            "logging": {"enable": true},
            "processRules": [{"selector": "a", "ioPriority": "High"}, {"selector": "b", "ioPriority": "Low"}],
            "serviceRules": [{"selector": "s", "ioPriority": "High"}]
        });

        let output = RemoveHighIoPriorityAndLogging.migrate(input).unwrap();
        assert!(output.get("logging").is_none());
        assert_eq!(
            output["processRules"],
            json!([{"selector": "a"}, {"selector": "b", "ioPriority": "Low"}])
        );
        assert_eq!(output["serviceRules"], json!([{"selector": "s"}]));
    }

    #[test]
    fn test_preconditions_follow_version() {
        assert!(SplitRules.should_migrate(&json!({})));
        assert!(SplitRules.should_migrate(&json!({"version": null})));
        assert!(!SplitRules.should_migrate(&json!({"version": 1})));
        assert!(NewRuleFields.should_migrate(&json!({"version": 1})));
        assert!(!NewRuleFields.should_migrate(&json!({"version": 2})));
        assert!(RemoveHighIoPriorityAndLogging.should_migrate(&json!({"version": 2})));
    }

    #[test]
    fn test_chain_starts_mid_way() {
        let input = json!({"version": 2, "processRules": [{"selector": "a", "ioPriority": "High"}]});
        let (output, applied) = migrate_value(input, &all_migrations()).unwrap();
        assert_eq!(applied, vec![("RemoveHighIoPriorityAndLogging", 3)]);
        assert_eq!(output["version"], json!(3));
    }

    #[test]
    fn test_current_document_is_untouched() {
        let input = json!({"version": 3, "processRules": []});
        let (output, applied) = migrate_value(input.clone(), &all_migrations()).unwrap();
        assert!(applied.is_empty());
        assert_eq!(output, input);
    }

    #[test]
    fn test_malformed_rules_abort_chain() {
        let input = json!({"rules": "not a list"});
        let err = migrate_value(input, &all_migrations()).unwrap_err();
        assert!(err.to_string().contains("SplitRules"));
    }

    #[test]
    fn test_non_object_root_fails() {
        let err = migrate_value(json!([1, 2]), &all_migrations()).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }
}
