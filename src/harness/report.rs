//! Verdict aggregation.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::harness::discovery::{SuiteKind, alphanumeric_cmp};

/// Pass/fail plus the diagnostic message for one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub scenario: String,
    pub passed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<SuiteKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub duration_ms: u64,
}

impl Verdict {
    #[must_use]
    pub fn new(scenario: impl Into<String>, passed: bool, message: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            passed,
            message: message.into(),
            suite: None,
            source: None,
            digest: None,
            duration_ms: 0,
        }
    }

    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        if self.passed { "OK" } else { "KO" }
    }
}

/// Suite plus scenario name; names are only unique within a suite.
type VerdictKey = (Option<SuiteKind>, String);

/// Verdicts keyed by suite and scenario name.
#[derive(Debug, Clone, Default)]
pub struct Report {
    verdicts: HashMap<VerdictKey, Verdict>,
}

/// Serializable view of a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary<'a> {
    pub passed: bool,
    pub total: usize,
    pub failed: usize,
    pub verdicts: Vec<&'a Verdict>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `verdict`, returning the one it replaced under the same suite
    /// and name.
    pub fn record(&mut self, verdict: Verdict) -> Option<Verdict> {
        self.verdicts
            .insert((verdict.suite, verdict.scenario.clone()), verdict)
    }

    /// Fold another report in; later verdicts win within a suite.
    pub fn merge(&mut self, other: Self) -> Vec<String> {
        let mut replaced = Vec::new();
        for (_, verdict) in other.verdicts {
            let name = verdict.scenario.clone();
            if self.record(verdict).is_some() {
                replaced.push(name);
            }
        }
        replaced.sort_by(|a, b| alphanumeric_cmp(a, b));
        replaced
    }

    /// First verdict named `scenario` in display order, whatever its suite.
    #[must_use]
    pub fn get(&self, scenario: &str) -> Option<&Verdict> {
        self.ordered().into_iter().find(|v| v.scenario == scenario)
    }

    #[must_use]
    pub fn get_in(&self, suite: Option<SuiteKind>, scenario: &str) -> Option<&Verdict> {
        self.verdicts.get(&(suite, scenario.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// True iff every verdict passed; an empty report passes.
    #[must_use]
    pub fn overall_passed(&self) -> bool {
        self.verdicts.values().all(|v| v.passed)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.verdicts.values().filter(|v| !v.passed).count()
    }

    /// Verdicts in display order: by suite, then numeric key of the name,
    /// then name.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Verdict> {
        let mut list: Vec<&Verdict> = self.verdicts.values().collect();
        list.sort_by(|a, b| {
            a.suite
                .cmp(&b.suite)
                .then_with(|| alphanumeric_cmp(&a.scenario, &b.scenario))
        });
        list
    }

    #[must_use]
    pub fn summary(&self) -> ReportSummary<'_> {
        ReportSummary {
            passed: self.overall_passed(),
            total: self.len(),
            failed: self.failed_count(),
            verdicts: self.ordered(),
        }
    }

    /// Plain-text log: one `name :: OK|KO` header plus message per verdict.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for verdict in self.ordered() {
            let _ = writeln!(out, "{} :: {}", verdict.scenario, verdict.status_label());
            let _ = writeln!(out, "{}", verdict.message);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_passes() {
        let report = Report::new();
        assert!(report.overall_passed());
        assert!(report.is_empty());
        assert_eq!(report.render(), "");
    }

    #[test]
    fn one_failure_fails_the_report() {
        let mut report = Report::new();
        report.record(Verdict::new("Search 1", true, "ok"));
        report.record(Verdict::new("Search 2", false, "ko"));
        assert!(!report.overall_passed());
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn later_verdict_replaces_earlier() {
        let mut report = Report::new();
        assert!(report.record(Verdict::new("dup", false, "first")).is_none());
        let replaced = report.record(Verdict::new("dup", true, "second")).unwrap();
        assert_eq!(replaced.message, "first");
        assert_eq!(report.len(), 1);
        assert!(report.overall_passed());
    }

    #[test]
    fn display_order_is_alphanumeric() {
        let mut report = Report::new();
        for name in ["Test 10", "Test 2", "Intro", "Test 1"] {
            report.record(Verdict::new(name, true, ""));
        }
        let order: Vec<&str> = report.ordered().iter().map(|v| v.scenario.as_str()).collect();
        assert_eq!(order, vec!["Intro", "Test 1", "Test 2", "Test 10"]);
    }

    #[test]
    fn render_lists_status_and_message() {
        let mut report = Report::new();
        report.record(Verdict::new("Search 1", false, "line one\nline two"));
        assert_eq!(report.render(), "Search 1 :: KO\nline one\nline two\n\n");
    }

    #[test]
    fn merge_reports_replacements() {
        let mut a = Report::new();
        a.record(Verdict::new("x", true, ""));
        let mut b = Report::new();
        b.record(Verdict::new("x", false, ""));
        b.record(Verdict::new("y", true, ""));
        assert_eq!(a.merge(b), vec!["x"]);
        assert_eq!(a.len(), 2);
        assert!(!a.overall_passed());
    }

    #[test]
    fn same_name_in_different_suites_is_kept_apart() {
        let mut failing = Verdict::new("Test 1", false, "ko");
        failing.suite = Some(SuiteKind::Search);
        let mut passing = Verdict::new("Test 1", true, "ok");
        passing.suite = Some(SuiteKind::SearchRules);

        let mut report = Report::new();
        assert!(report.record(failing).is_none());
        assert!(report.record(passing).is_none());
        assert_eq!(report.len(), 2);
        assert!(!report.overall_passed());
        assert!(!report.get_in(Some(SuiteKind::Search), "Test 1").unwrap().passed);
        assert!(report.get_in(Some(SuiteKind::SearchRules), "Test 1").unwrap().passed);
        assert_eq!(report.get("Test 1").unwrap().suite, Some(SuiteKind::Search));
    }

    #[test]
    fn summary_serializes() {
        let mut report = Report::new();
        report.record(Verdict::new("s", true, "m"));
        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["passed"], true);
        assert_eq!(json["verdicts"][0]["scenario"], "s");
        assert!(json["verdicts"][0].get("suite").is_none());
    }
}
