//! Aggregated verification results

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::violation::{CheckName, Violation};

/// Violations of one run, grouped by check
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Report {
    /// Checks that ran, clean or not
    pub checks: Vec<CheckName>,
    /// Violations per check; clean checks have no entry
    pub violations: BTreeMap<CheckName, Vec<Violation>>,
}

impl Report {
    /// Record the outcome of one check
    pub fn record(&mut self, check: CheckName, violations: Vec<Violation>) {
        self.checks.push(check);
        if !violations.is_empty() {
            self.violations.entry(check).or_default().extend(violations);
        }
    }

    /// No check found anything
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Total number of violations
    pub fn len(&self) -> usize {
        self.violations.values().map(Vec::len).sum()
    }

    /// Whether there are no violations
    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }

    /// Violations of one check
    pub fn for_check(&self, check: CheckName) -> &[Violation] {
        self.violations.get(&check).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every violation, grouped by check order
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.values().flatten()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            match self.violations.get(check) {
                None => writeln!(f, "{check}: ok")?,
                Some(violations) => {
                    writeln!(f, "{check}: {} violation(s)", violations.len())?;
                    for violation in violations {
                        writeln!(f, "  {violation}")?;
                    }
                }
            }
        }
        write!(
            f,
            "{} violation(s) across {} check(s)",
            self.len(),
            self.checks.len()
        )
    }
}
