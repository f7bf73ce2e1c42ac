//! Result comparison: map returned records back to scenario inputs and
//! explain how they differ from the expected set.
//!
//! Record differences use *set* subtraction: every actual record equal to
//! some expected record is removed, however many copies there are. Two
//! identical surplus records therefore show up in the size delta but not in
//! the list of unexpected names.

#![allow(missing_docs)]

use std::fmt::Write as _;

use serde::Serialize;

use crate::model::record::Record;

/// Name reported for a returned record that matches no input.
pub const NOT_FOUND: &str = "not found";

/// Classification of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Same size and every expected record was returned.
    Match,
    /// More records returned than expected.
    Surplus {
        /// `|actual| - |expected|`.
        delta: usize,
        /// Names of `actual - expected`, sorted.
        unexpected: Vec<String>,
    },
    /// Fewer records returned than expected.
    Shortfall {
        /// `|expected| - |actual|`.
        delta: usize,
        /// Names of `expected - actual`, sorted.
        missing: Vec<String>,
    },
    /// Same size, different records.
    Mismatch {
        missing: Vec<String>,
        unexpected_count: usize,
    },
}

impl Outcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Size difference between actual and expected.
    #[must_use]
    pub const fn size_delta(&self) -> usize {
        match self {
            Self::Surplus { delta, .. } | Self::Shortfall { delta, .. } => *delta,
            Self::Match | Self::Mismatch { .. } => 0,
        }
    }
}

/// Full comparison result with its diagnostic trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub outcome: Outcome,
    /// Input names in declaration order.
    pub tested: Vec<String>,
    /// Expected names as authored.
    pub expected: Vec<String>,
    /// Resolved names of the returned records, sorted.
    pub returned: Vec<String>,
    pub message: String,
}

impl Comparison {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

/// Name of the first input resolution-equal to `record`, or [`NOT_FOUND`].
#[must_use]
pub fn resolve_name<'a>(record: &Record, inputs: &'a [Record]) -> &'a str {
    inputs
        .iter()
        .find(|input| record.resolves_to(input))
        .map_or(NOT_FOUND, |input| input.name.as_str())
}

/// Inputs named by `expected_names`, in that order; unknown names are dropped.
#[must_use]
pub fn resolve_expected<'a>(inputs: &'a [Record], expected_names: &[String]) -> Vec<&'a Record> {
    let mut resolved: Vec<&Record> = Vec::with_capacity(expected_names.len());
    for name in expected_names {
        if let Some(input) = inputs.iter().find(|i| &i.name == name) {
            if !resolved.iter().any(|r| r.name == input.name) {
                resolved.push(input);
            }
        }
    }
    resolved
}

/// Compare `actual` against the inputs named in `expected_names`.
#[must_use]
pub fn compare(actual: &[Record], inputs: &[Record], expected_names: &[String]) -> Comparison {
    let inputs: Vec<Record> = inputs.iter().map(Record::canonicalized).collect();
    let mut actual: Vec<Record> = actual.iter().map(Record::canonicalized).collect();
    for record in &mut actual {
        record.name = resolve_name(record, &inputs).to_string();
    }
    let expected = resolve_expected(&inputs, expected_names);

    let tested: Vec<String> = inputs.iter().map(|r| r.name.clone()).collect();
    let mut returned: Vec<String> = actual.iter().map(|r| r.name.clone()).collect();
    returned.sort();

    let outcome = classify(&actual, &expected);

    let mut message = String::new();
    let _ = writeln!(message, "Tested identities: {}", tested.join(", "));
    let _ = writeln!(message, "Expected identities: {}", expected_names.join(", "));
    let _ = writeln!(message, "Returned identities: {}", returned.join(", "));
    message.push_str(&describe(&outcome));

    Comparison {
        outcome,
        tested,
        expected: expected_names.to_vec(),
        returned,
        message,
    }
}

fn classify(actual: &[Record], expected: &[&Record]) -> Outcome {
    let unexpected: Vec<&Record> = actual
        .iter()
        .filter(|a| !expected.iter().any(|e| **e == **a))
        .collect();
    let missing: Vec<&Record> = expected
        .iter()
        .copied()
        .filter(|e| !actual.iter().any(|a| a == *e))
        .collect();

    if actual.len() > expected.len() {
        Outcome::Surplus {
            delta: actual.len() - expected.len(),
            unexpected: sorted_names(&unexpected),
        }
    } else if actual.len() < expected.len() {
        Outcome::Shortfall {
            delta: expected.len() - actual.len(),
            missing: sorted_names(&missing),
        }
    } else if missing.is_empty() {
        Outcome::Match
    } else {
        Outcome::Mismatch {
            missing: sorted_names(&missing),
            unexpected_count: unexpected.len(),
        }
    }
}

fn sorted_names(records: &[&Record]) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
    names.sort();
    names
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "identity" } else { "identities" }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Match => "The result matches the expected identities.".to_string(),
        Outcome::Surplus { delta, unexpected } => {
            let mut line = format!(
                "The result contains {delta} more {} than expected.",
                plural(*delta)
            );
            if !unexpected.is_empty() {
                let _ = write!(
                    line,
                    " Not expected ({}): {}",
                    unexpected.len(),
                    unexpected.join(", ")
                );
            }
            line
        }
        Outcome::Shortfall { delta, missing } => {
            let mut line = format!(
                "The result contains {delta} fewer {} than expected.",
                plural(*delta)
            );
            if !missing.is_empty() {
                let _ = write!(line, " Not returned: {}", missing.join(", "));
            }
            line
        }
        Outcome::Mismatch {
            missing,
            unexpected_count,
        } => {
            let mut line = format!(
                "{} expected {} not returned: {}",
                missing.len(),
                plural(missing.len()),
                missing.join(", ")
            );
            if *unexpected_count > 0 {
                let _ = write!(
                    line,
                    "\nThe result contains {unexpected_count} {} not listed as expected.",
                    plural(*unexpected_count)
                );
            }
            line
        }
    }
}
