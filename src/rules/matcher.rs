//! Rule resolution
//!
//! Service rules are checked first, against the service a process runs, and
//! win exclusively. Process rules follow, against the process itself. Within
//! each list the first matching rule wins.

use super::pattern_matcher::PatternCache;
use crate::config::{Config, Rule, RuleKind};
use crate::error::RuleError;
use crate::models::{ProcessSnapshot, SelectorBy, ServiceSnapshot};
use log::error;
use serde::Serialize;
use std::collections::HashSet;

/// A rule that matched, with where it lives in the rule file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleMatch<'a> {
    pub kind: RuleKind,
    pub index: usize,
    pub rule: &'a Rule,
}

/// Attributes a selector can be compared with
struct Candidate<'a> {
    name: &'a str,
    bin_path: &'a str,
    cmd_line: &'a str,
}

impl<'a> Candidate<'a> {
    fn process(process: &'a ProcessSnapshot) -> Self {
        Self {
            name: &process.name,
            bin_path: &process.bin_path,
            cmd_line: &process.cmd_line,
        }
    }

    fn service(service: &'a ServiceSnapshot) -> Self {
        Self {
            name: &service.name,
            bin_path: &service.bin_path,
            cmd_line: &service.cmd_line,
        }
    }

    fn value(&self, selector_by: &SelectorBy) -> Result<&'a str, RuleError> {
        match selector_by {
            SelectorBy::Name => Ok(self.name),
            SelectorBy::Path => Ok(self.bin_path),
            SelectorBy::CommandLine => Ok(self.cmd_line),
            SelectorBy::Unknown(other) => Err(RuleError::UnknownSelectorType(other.clone())),
        }
    }
}

/// Matches processes against a rule set, caching compiled selectors
#[derive(Debug, Default)]
pub struct RuleMatcher {
    patterns: PatternCache,
    reported: HashSet<String>,
}

impl RuleMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single rule governing `process`, if any
    pub fn first_match<'a>(
        &mut self,
        config: &'a Config,
        process: &ProcessSnapshot,
    ) -> Result<Option<RuleMatch<'a>>, RuleError> {
        if let Some(service) = process.service.as_ref().filter(|s| s.is_running()) {
            let candidate = Candidate::service(service);
            if let Some(found) = self.first_in(config, RuleKind::Service, &candidate)? {
                return Ok(Some(found));
            }
        }

        self.first_in(config, RuleKind::Process, &Candidate::process(process))
    }

    /// Every rule matching `process`, service rules first
    pub fn matching_rules<'a>(
        &mut self,
        config: &'a Config,
        process: &ProcessSnapshot,
    ) -> Result<Vec<RuleMatch<'a>>, RuleError> {
        let mut found = Vec::new();

        if let Some(service) = process.service.as_ref().filter(|s| s.is_running()) {
            self.collect_in(config, RuleKind::Service, &Candidate::service(service), &mut found)?;
        }
        self.collect_in(config, RuleKind::Process, &Candidate::process(process), &mut found)?;

        Ok(found)
    }

    /// `first_match`, logging an unknown selector type once per distinct value
    pub fn resolve<'a>(
        &mut self,
        config: &'a Config,
        process: &ProcessSnapshot,
    ) -> Option<RuleMatch<'a>> {
        match self.first_match(config, process) {
            Ok(found) => found,
            Err(RuleError::UnknownSelectorType(kind)) => {
                if self.reported.insert(kind.clone()) {
                    error!("{}", RuleError::UnknownSelectorType(kind));
                }
                None
            }
        }
    }

    /// Forget which unknown selector types were already logged
    pub fn reset_reports(&mut self) {
        self.reported.clear();
    }

    fn first_in<'a>(
        &mut self,
        config: &'a Config,
        kind: RuleKind,
        candidate: &Candidate<'_>,
    ) -> Result<Option<RuleMatch<'a>>, RuleError> {
        for (index, rule) in config.rules(kind).iter().enumerate() {
            let value = candidate.value(&rule.selector_by)?;
            if self.patterns.matches(&rule.selector, value) {
                return Ok(Some(RuleMatch { kind, index, rule }));
            }
        }
        Ok(None)
    }

    fn collect_in<'a>(
        &mut self,
        config: &'a Config,
        kind: RuleKind,
        candidate: &Candidate<'_>,
        found: &mut Vec<RuleMatch<'a>>,
    ) -> Result<(), RuleError> {
        for (index, rule) in config.rules(kind).iter().enumerate() {
            let value = candidate.value(&rule.selector_by)?;
            if self.patterns.matches(&rule.selector, value) {
                found.push(RuleMatch { kind, index, rule });
            }
        }
        Ok(())
    }
}
