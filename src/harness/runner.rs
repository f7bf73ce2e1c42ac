//! Scenario execution: create the inputs, let the service settle, drive the
//! scenario's operation, compare, then purge.
//!
//! Purging is tied to a drop guard so it also runs when setup fails, when the
//! operation returns a transport error, or when comparison panics.
//!
//! ```text
//! Init ─▶ InputsLoaded ─▶ OperationExecuted ─▶ Compared ─▶ Cleaned
//!   └──────────┴────────────────┴── (error / panic) ──────────┘
//! ```

#![allow(missing_docs)]

use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::core::errors::{IshError, Result};
use crate::harness::comparator::{Comparison, compare};
use crate::harness::context::HarnessContext;
use crate::harness::discovery::SuiteKind;
use crate::harness::report::Verdict;
use crate::logger::dual::ActivityEvent;
use crate::model::duplicate_rule::DuplicateRule;
use crate::model::record::Record;
use crate::model::scenario::{Operation, Scenario};
use crate::sut::SearchAttribute;

/// Lifecycle of one scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    Init,
    InputsLoaded,
    OperationExecuted,
    Compared,
    Cleaned,
}

/// What a finished scenario produced.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub verdict: Verdict,
    pub comparison: Comparison,
    /// Phases in the order they were reached.
    pub phases: Vec<ScenarioPhase>,
    pub created: usize,
    pub rejected: usize,
    /// False when a purge step failed; the failure was logged.
    pub cleaned: bool,
}

// ──────────────────── cleanup guard ────────────────────

/// Truncates the store and resets the index when dropped.
struct PurgeOnDrop<'a> {
    ctx: &'a HarnessContext,
    scenario: &'a str,
    armed: bool,
}

impl<'a> PurgeOnDrop<'a> {
    const fn new(ctx: &'a HarnessContext, scenario: &'a str) -> Self {
        Self {
            ctx,
            scenario,
            armed: true,
        }
    }

    /// Purge now and report whether every step succeeded.
    fn finish(mut self) -> bool {
        self.armed = false;
        self.purge()
    }

    fn purge(&self) -> bool {
        let purger = self.ctx.purger();
        let mut clean = true;
        for step in [purger.truncate_store(), purger.reset_index()] {
            if let Err(err) = step {
                clean = false;
                self.ctx.log(ActivityEvent::CleanupFailed {
                    scenario: self.scenario.to_string(),
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
        }
        if clean {
            self.ctx.log(ActivityEvent::CleanupDone {
                scenario: self.scenario.to_string(),
            });
        }
        clean
    }
}

impl Drop for PurgeOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.purge();
        }
    }
}

// ──────────────────── runner ────────────────────

pub struct ScenarioRunner<'a> {
    ctx: &'a HarnessContext,
    suite: Option<SuiteKind>,
}

struct Loaded {
    accepted: Vec<Record>,
    rejected: usize,
}

impl<'a> ScenarioRunner<'a> {
    #[must_use]
    pub const fn new(ctx: &'a HarnessContext, suite: Option<SuiteKind>) -> Self {
        Self { ctx, suite }
    }

    /// Run one scenario end to end.
    ///
    /// Returns `Err` only for transport failures and refused rule
    /// registrations; state is purged either way.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioRun> {
        let started = Instant::now();
        let mut phases = vec![ScenarioPhase::Init];
        self.ctx.log(ActivityEvent::ScenarioStarted {
            suite: self.suite.map_or("adhoc", SuiteKind::label).to_string(),
            scenario: scenario.name.clone(),
            source: scenario.source.as_ref().map(|p| p.display().to_string()),
        });

        let guard = PurgeOnDrop::new(self.ctx, &scenario.name);

        let loaded = self.load_inputs(scenario)?;
        phases.push(ScenarioPhase::InputsLoaded);

        let settle = self.ctx.settle_interval();
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let actual = self.execute(scenario, &loaded)?;
        phases.push(ScenarioPhase::OperationExecuted);

        let comparison = compare(&actual, &scenario.inputs, &scenario.expected_names);
        phases.push(ScenarioPhase::Compared);

        let cleaned = guard.finish();
        phases.push(ScenarioPhase::Cleaned);

        let mut verdict = Verdict::new(
            scenario.name.clone(),
            comparison.passed(),
            comparison.message.clone(),
        );
        verdict.suite = self.suite;
        verdict.source.clone_from(&scenario.source);
        verdict.duration_ms = elapsed_ms(started);

        Ok(ScenarioRun {
            verdict,
            comparison,
            phases,
            created: loaded.accepted.len(),
            rejected: loaded.rejected,
            cleaned,
        })
    }

    fn load_inputs(&self, scenario: &Scenario) -> Result<Loaded> {
        let client = self.ctx.client();
        let mut accepted = Vec::with_capacity(scenario.inputs.len());
        let mut rejected = 0;
        for input in &scenario.inputs {
            let response = client.create_record(input, self.ctx.app())?;
            if response.status.is_success() {
                self.ctx.log(ActivityEvent::RecordCreated {
                    scenario: scenario.name.clone(),
                    record: input.name.clone(),
                    customer_id: response.customer_id.clone(),
                });
                let mut created = input.clone();
                created.customer_id = response.customer_id;
                if response.connection_id.is_some() {
                    created.connection_id = response.connection_id;
                }
                accepted.push(created);
            } else {
                rejected += 1;
                self.ctx.log(ActivityEvent::RecordRejected {
                    scenario: scenario.name.clone(),
                    record: input.name.clone(),
                    status: response.status.to_string(),
                    message: response.status.message.clone(),
                });
            }
        }
        Ok(Loaded { accepted, rejected })
    }

    fn execute(&self, scenario: &Scenario, loaded: &Loaded) -> Result<Vec<Record>> {
        let started = Instant::now();
        let (status, records) = match &scenario.operation {
            // Accepted inputs, not a read-back from the SUT.
            Operation::CreateAndVerify => ("SUCCESS".to_string(), loaded.accepted.clone()),
            Operation::Search { query } => self.search(query)?,
            Operation::Duplicate { rule, candidate } => self.duplicates(rule, candidate)?,
        };
        self.ctx.log(ActivityEvent::OperationExecuted {
            scenario: scenario.name.clone(),
            operation: scenario.operation.kind().label().to_string(),
            status,
            returned: records.len(),
            duration_ms: elapsed_ms(started),
        });
        Ok(records)
    }

    fn search(&self, query: &Record) -> Result<(String, Vec<Record>)> {
        let honor = self.suite.is_some_and(SuiteKind::honors_search_type);
        let criteria = SearchAttribute::from_query(query, honor);
        let response = self.ctx.client().search_records(&criteria)?;
        let records = if response.status.is_ok() {
            response.records
        } else {
            Vec::new()
        };
        Ok((response.status.kind.as_str().to_string(), records))
    }

    fn duplicates(&self, rule: &DuplicateRule, candidate: &Record) -> Result<(String, Vec<Record>)> {
        let client = self.ctx.client();
        let registered = client.register_duplicate_rule(&rule.for_registration())?;
        if !registered.is_ok() {
            return Err(IshError::Rejected {
                operation: "register_duplicate_rule",
                details: format!("rule {}: {registered}", rule.code),
            });
        }
        let codes = vec![rule.code.clone()];
        let response = client.find_duplicates(candidate, &codes)?;
        let records = if response.status.is_ok() {
            response.records_for(&codes)
        } else {
            Vec::new()
        };
        Ok((response.status.kind.as_str().to_string(), records))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::core::config::Config;
    use crate::sut::memory::MemorySut;

    fn context(sut: &Arc<MemorySut>) -> HarnessContext {
        let mut config = Config::default();
        config.harness.settle_interval_ms = 0;
        HarnessContext::in_memory(config, Arc::clone(sut))
    }

    fn scenario(json: &str) -> Scenario {
        Scenario::from_json(json, Path::new("inline.json")).unwrap()
    }

    const SEARCH: &str = r#"{
        "testDefinition": {
            "name": "Search 1",
            "inputs": [
                {"name": "Alice", "attributes": [
                    {"key": "first_name", "value": "Alice"},
                    {"key": "family_name", "value": "Martin"}]},
                {"name": "Bob", "attributes": [
                    {"key": "first_name", "value": "Bob"},
                    {"key": "family_name", "value": "Martin"}]}
            ],
            "expected": ["Alice", "Bob"],
            "searchRequest": {"attributes": [{"key": "family_name", "value": "martin"}]}
        }
    }"#;

    #[test]
    fn search_scenario_passes_and_purges() {
        let sut = Arc::new(MemorySut::new());
        let ctx = context(&sut);
        let run = ScenarioRunner::new(&ctx, Some(SuiteKind::Search))
            .run(&scenario(SEARCH))
            .unwrap();

        assert!(run.verdict.passed, "{}", run.verdict.message);
        assert_eq!(run.created, 2);
        assert_eq!(
            run.phases,
            vec![
                ScenarioPhase::Init,
                ScenarioPhase::InputsLoaded,
                ScenarioPhase::OperationExecuted,
                ScenarioPhase::Compared,
                ScenarioPhase::Cleaned,
            ]
        );
        assert!(run.cleaned);
        let stats = sut.stats();
        assert_eq!(stats.stored, 0);
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.index_resets, 1);
    }

    #[test]
    fn create_and_verify_compares_accepted_records() {
        let sut = Arc::new(MemorySut::new());
        let ctx = context(&sut);
        let run = ScenarioRunner::new(&ctx, None)
            .run(&scenario(
                r#"{"testDefinition": {
                    "name": "Create 1",
                    "inputs": [
                        {"name": "Kept", "connectionId": "c1",
                         "attributes": [{"key": "email", "value": "k@example.org"}]},
                        {"name": "Twin", "connectionId": "c1",
                         "attributes": [{"key": "email", "value": "t@example.org"}]}
                    ],
                    "expected": ["Kept"]
                }}"#,
            ))
            .unwrap();

        assert_eq!(run.rejected, 1);
        assert!(run.verdict.passed, "{}", run.verdict.message);
        assert!(run.cleaned);
        let stats = sut.stats();
        assert_eq!(stats.stored, 0);
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.index_resets, 1);
    }

    #[test]
    fn settle_interval_elapses_before_the_operation() {
        let sut = Arc::new(MemorySut::new());
        let mut config = Config::default();
        config.harness.settle_interval_ms = 50;
        let ctx = HarnessContext::in_memory(config, Arc::clone(&sut));

        let started = Instant::now();
        let run = ScenarioRunner::new(&ctx, Some(SuiteKind::Search))
            .run(&scenario(SEARCH))
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(run.verdict.duration_ms >= 50);
        assert!(run.verdict.passed, "{}", run.verdict.message);
    }

    #[test]
    fn guard_purges_when_a_step_panics() {
        let sut = Arc::new(MemorySut::new());
        let ctx = context(&sut);
        let search = scenario(SEARCH);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = PurgeOnDrop::new(&ctx, &search.name);
            let loaded = ScenarioRunner::new(&ctx, None).load_inputs(&search).unwrap();
            assert_eq!(loaded.accepted.len(), 2);
            panic!("comparison failed unexpectedly");
        }));

        assert!(outcome.is_err());
        let stats = sut.stats();
        assert_eq!(stats.stored, 0);
        assert_eq!(stats.truncations, 1);
        assert_eq!(stats.index_resets, 1);
    }

    #[test]
    fn transport_failure_still_purges() {
        let sut = Arc::new(MemorySut::new());
        sut.fail_operation("search");
        let ctx = context(&sut);
        let err = ScenarioRunner::new(&ctx, Some(SuiteKind::Search))
            .run(&scenario(SEARCH))
            .unwrap_err();

        assert_eq!(err.code(), "ISH-3001");
        assert_eq!(sut.stats().stored, 0);
        assert_eq!(sut.stats().truncations, 1);
    }

    #[test]
    fn failing_cleanup_does_not_fail_the_scenario() {
        let sut = Arc::new(MemorySut::new());
        sut.fail_operation("reset_index");
        let ctx = context(&sut);
        let run = ScenarioRunner::new(&ctx, Some(SuiteKind::Search))
            .run(&scenario(SEARCH))
            .unwrap();
        assert!(run.verdict.passed);
        assert!(!run.cleaned);
    }

    #[test]
    fn refused_rule_is_fatal() {
        let sut = Arc::new(MemorySut::new());
        sut.refuse_rule("R1");
        let ctx = context(&sut);
        let err = ScenarioRunner::new(&ctx, Some(SuiteKind::Duplicates))
            .run(&scenario(
                r#"{"testDefinition": {
                    "name": "Dup 1",
                    "inputs": [{"name": "A", "attributes": [{"key": "email", "value": "a@x"}]}],
                    "expected": [],
                    "searchRequest": {"attributes": [{"key": "email", "value": "a@x"}]},
                    "duplicateRule": {"name": "email", "code": "R1",
                        "checkedAttributes": ["email"], "nbEqualAttributes": 1}
                }}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, IshError::Rejected { .. }));
        assert_eq!(sut.stats().stored, 0);
    }
}
