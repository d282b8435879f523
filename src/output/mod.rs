//! Output formatting for `procgov list`
//!
//! Handles:
//! - Building the listing from one enumeration pass and the rule set
//! - Human-readable output
//! - JSON output

use crate::config::{Config, Rule, RuleKind};
use crate::models::{IoPriority, Priority, ProcessSnapshot};
use crate::rules::{RuleMatch, RuleMatcher};
use anyhow::Result;
use log::warn;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, Write};

/// A rule as shown in the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedRule {
    pub kind: RuleKind,
    pub index: usize,
    pub selector_by: String,
    pub selector: String,
}

impl From<RuleMatch<'_>> for ListedRule {
    fn from(found: RuleMatch<'_>) -> Self {
        let Rule {
            selector_by,
            selector,
            ..
        } = found.rule;

        Self {
            kind: found.kind,
            index: found.index,
            selector_by: selector_by.to_string(),
            selector: selector.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedProcess {
    pub pid: u32,
    pub name: String,
    pub bin_path: String,
    pub cmd_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub priority: Option<Priority>,
    pub io_priority: Option<IoPriority>,
    pub affinity: Vec<usize>,
    /// Every matching rule; the first one governs the process
    pub rules: Vec<ListedRule>,
}

impl ListedProcess {
    pub fn governing_rule(&self) -> Option<&ListedRule> {
        self.rules.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListSummary {
    pub processes: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListOutput {
    pub results: Vec<ListedProcess>,
    pub summary: ListSummary,
}

/// Match every snapshot against `config`; keep unmatched processes only when
/// `all` is set
pub fn build_listing(
    config: &Config,
    snapshots: &HashMap<u32, ProcessSnapshot>,
    all: bool,
) -> ListOutput {
    let mut matcher = RuleMatcher::new();
    let mut pids: Vec<u32> = snapshots.keys().copied().collect();
    pids.sort_unstable();

    let mut output = ListOutput::default();
    output.summary.processes = pids.len();

    for pid in pids {
        let process = &snapshots[&pid];
        let rules: Vec<ListedRule> = match matcher.matching_rules(config, process) {
            Ok(found) => found.into_iter().map(ListedRule::from).collect(),
            Err(e) => {
                warn!("Skipping rules for {}: {}", process.key(), e);
                Vec::new()
            }
        };

        if !rules.is_empty() {
            output.summary.matched += 1;
        } else if !all {
            continue;
        }

        output.results.push(ListedProcess {
            pid,
            name: process.name.clone(),
            bin_path: process.bin_path.clone(),
            cmd_line: process.cmd_line.clone(),
            service: process.service.as_ref().map(|s| s.name.clone()),
            priority: process.priority,
            io_priority: process.io_priority,
            affinity: process.affinity.clone(),
            rules,
        });
    }

    output
}

/// Format output in human-readable format
pub fn format_human(output: &ListOutput) -> Result<()> {
    let stdout = io::stdout();
    write_human(&mut stdout.lock(), output)
}

pub fn format_json(output: &ListOutput) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

pub fn write_human(out: &mut impl Write, output: &ListOutput) -> Result<()> {
    if output.results.is_empty() {
        writeln!(out, "No processes matched any rule.")?;
    } else {
        for process in &output.results {
            match &process.service {
                Some(service) => writeln!(out, "{} ({}) [service {}]:", process.name, process.pid, service)?,
                None => writeln!(out, "{} ({}):", process.name, process.pid)?,
            }

            if !process.bin_path.is_empty() {
                writeln!(out, "  Path: {}", process.bin_path)?;
            }
            writeln!(
                out,
                "  Priority: {}, I/O priority: {}, Affinity: {}",
                display_or_unknown(process.priority),
                display_or_unknown(process.io_priority),
                crate::config::affinity::format_affinity(&process.affinity)
            )?;

            match process.governing_rule() {
                Some(rule) => writeln!(
                    out,
                    "  Rule: {}[{}] {} `{}`",
                    rule.kind.field(),
                    rule.index,
                    rule.selector_by,
                    rule.selector
                )?,
                None => writeln!(out, "  Rule: none")?,
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "Summary:")?;
    writeln!(out, "  Processes: {}", output.summary.processes)?;
    writeln!(out, "  Matched: {}", output.summary.matched)?;

    Ok(())
}

fn display_or_unknown<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceSnapshot;

    fn snapshot(pid: u32, name: &str) -> ProcessSnapshot {
        ProcessSnapshot {
            pid,
            name: name.to_string(),
            bin_path: format!("/usr/bin/{}", name),
            cmd_line: name.to_string(),
            priority: Some(Priority::Normal),
            io_priority: Some(IoPriority::Normal),
            affinity: vec![0, 1, 2, 3],
            service: None,
            is_new: true,
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.process_rules.push(Rule::new("fire*"));
        config.process_rules.push(Rule::new("*fox"));
        config.service_rules.push(Rule::new("cups"));
        config
    }

    fn snapshots() -> HashMap<u32, ProcessSnapshot> {
        let mut cupsd = snapshot(3, "cupsd");
        cupsd.service = Some(ServiceSnapshot {
            pid: 3,
            name: "cups".to_string(),
            display_name: "CUPS".to_string(),
            status: "running".to_string(),
            bin_path: "/usr/sbin/cupsd".to_string(),
            cmd_line: "/usr/sbin/cupsd -l".to_string(),
        });

        HashMap::from([(1, snapshot(1, "firefox")), (2, snapshot(2, "bash")), (3, cupsd)])
    }

    #[test]
    fn test_listing_keeps_matched_only() {
        let output = build_listing(&config(), &snapshots(), false);

        assert_eq!(output.summary, ListSummary { processes: 3, matched: 2 });
        let pids: Vec<u32> = output.results.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![1, 3]);

        let firefox = &output.results[0];
        assert_eq!(firefox.rules.len(), 2);
        assert_eq!(firefox.governing_rule().unwrap().selector, "fire*");
        assert_eq!(output.results[1].governing_rule().unwrap().kind, RuleKind::Service);
    }

    #[test]
    fn test_listing_all_includes_unmatched() {
        let output = build_listing(&config(), &snapshots(), true);
        assert_eq!(output.results.len(), 3);
        assert!(output.results[1].rules.is_empty());
    }

    #[test]
    fn test_human_output() {
        let output = build_listing(&config(), &snapshots(), false);
        let mut buffer = Vec::new();
        write_human(&mut buffer, &output).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("firefox (1):"));
        assert!(text.contains("  Rule: processRules[0] Name `fire*`"));
        assert!(text.contains("cupsd (3) [service cups]:"));
        assert!(text.contains("Affinity: 0-3"));
        assert!(text.contains("  Matched: 2"));
    }

    #[test]
    fn test_human_output_empty() {
        let mut buffer = Vec::new();
        write_human(&mut buffer, &ListOutput::default()).unwrap();
        assert!(String::from_utf8(buffer).unwrap().starts_with("No processes matched any rule."));
    }

    #[test]
    fn test_json_field_names() {
        let output = build_listing(&config(), &snapshots(), false);
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["results"][0]["binPath"], "/usr/bin/firefox");
        assert_eq!(value["results"][0]["rules"][0]["selectorBy"], "Name");
        assert_eq!(value["results"][1]["service"], "cups");
        assert_eq!(value["summary"]["matched"], 2);
    }
}
