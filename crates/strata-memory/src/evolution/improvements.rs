//! Improvement strategies: pattern counts in, improvement texts out.

use super::patterns::PatternCounts;
use std::fmt::Debug;

/// Text recorded when a cycle finds nothing to change.
pub const NO_IMPROVEMENTS: &str = "No improvements needed at this time.";

/// Deterministic mapping from analyzed patterns to improvement texts.
pub trait ImprovementStrategy: Send + Sync + Debug {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    /// Improvements for `patterns`, in application order.
    fn generate(&self, patterns: &PatternCounts) -> Vec<String>;
}

/// Always reports that no improvements are needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderImprovements;

impl ImprovementStrategy for PlaceholderImprovements {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn generate(&self, _patterns: &PatternCounts) -> Vec<String> {
        vec![NO_IMPROVEMENTS.to_string()]
    }
}

/// Turns frequently recurring patterns into consolidation notes.
#[derive(Debug, Clone, Copy)]
pub struct RecurringPatternImprovements {
    /// Minimum count for a pattern to qualify.
    pub min_occurrences: usize,
    /// Cap on the number of improvements per cycle.
    pub max_improvements: usize,
}

impl Default for RecurringPatternImprovements {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            max_improvements: 5,
        }
    }
}

impl ImprovementStrategy for RecurringPatternImprovements {
    fn name(&self) -> &'static str {
        "recurring_patterns"
    }

    fn generate(&self, patterns: &PatternCounts) -> Vec<String> {
        let mut recurring: Vec<(&String, usize)> = patterns
            .iter()
            .filter(|(_, count)| **count >= self.min_occurrences)
            .map(|(pattern, count)| (pattern, *count))
            .collect();
        // BTreeMap iteration is already pattern-ascending; stable sort keeps it for ties.
        recurring.sort_by(|a, b| b.1.cmp(&a.1));
        recurring
            .into_iter()
            .take(self.max_improvements)
            .map(|(pattern, count)| {
                format!("Consolidate recurring pattern \"{pattern}\" (seen {count} times)")
            })
            .collect()
    }
}
