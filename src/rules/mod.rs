//! Rule matching and application

pub mod applicator;
pub mod matcher;
pub mod pattern_matcher;

pub use applicator::{apply_rule, should_apply, ApplyOutcome, FailureMemo, RuleApplicator};
pub use matcher::{RuleMatch, RuleMatcher};
pub use pattern_matcher::{selector_matches, PatternCache, SelectorPattern};
