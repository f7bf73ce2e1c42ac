//! Suite driver: discover scenario files, validate them all, run them in
//! order against the context's SUT and fold the verdicts into a [`Report`].

#![allow(missing_docs)]

use std::time::Instant;

use crate::core::errors::{IshError, Result};
use crate::harness::context::HarnessContext;
use crate::harness::discovery::{ScenarioFile, SuiteKind, discover};
use crate::harness::report::{Report, Verdict};
use crate::harness::runner::ScenarioRunner;
use crate::logger::dual::ActivityEvent;
use crate::model::scenario::Scenario;

/// Result of running one or more suites.
#[derive(Debug, Clone, Default)]
pub struct SuiteRun {
    pub report: Report,
    /// Scenario names whose earlier verdict was replaced.
    pub replaced: Vec<String>,
    /// Suites skipped because their directory does not exist.
    pub skipped: Vec<SuiteKind>,
}

impl SuiteRun {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.report.overall_passed()
    }
}

/// Scenario files of `suite`, parsed and validated, in execution order.
///
/// The first malformed file fails the whole call.
pub fn load_suite(ctx: &HarnessContext, suite: SuiteKind) -> Result<Vec<(ScenarioFile, Scenario)>> {
    let harness = &ctx.config().harness;
    discover(&harness.data_root, suite, &harness.inputs)?
        .into_iter()
        .map(|file| {
            let scenario = Scenario::load(&file.path)?;
            Ok((file, scenario))
        })
        .collect()
}

/// Run every scenario of `suite`, calling `observer` after each verdict.
///
/// Fatal errors (malformed file, transport failure, refused rule) abort the
/// suite without a report; mismatches only produce failing verdicts.
pub fn run_suite<F>(ctx: &HarnessContext, suite: SuiteKind, mut observer: F) -> Result<SuiteRun>
where
    F: FnMut(&Verdict),
{
    let started = Instant::now();
    let scenarios = match load_suite(ctx, suite) {
        Ok(scenarios) => scenarios,
        Err(err) => {
            ctx.log(ActivityEvent::error(None, &err));
            return Err(err);
        }
    };

    ctx.log(ActivityEvent::SuiteStarted {
        suite: suite.label().to_string(),
        scenarios: scenarios.len(),
        backend: ctx.client().backend_name().to_string(),
        config_hash: ctx.config().stable_hash().unwrap_or_default(),
    });

    if suite == SuiteKind::SearchRules {
        if let Err(err) = ctx.purger().clear_search_rules() {
            ctx.log(ActivityEvent::error(None, &err));
            return Err(err);
        }
    }

    let runner = ScenarioRunner::new(ctx, Some(suite));
    let mut run = SuiteRun::default();
    for (file, scenario) in &scenarios {
        let outcome = match runner.run(scenario) {
            Ok(outcome) => outcome,
            Err(err) => {
                ctx.log(ActivityEvent::error(Some(&scenario.name), &err));
                return Err(err);
            }
        };

        let mut verdict = outcome.verdict;
        verdict.digest = Some(file.digest.clone());
        ctx.log(verdict_event(&verdict));
        observer(&verdict);

        let name = verdict.scenario.clone();
        if run.report.record(verdict).is_some() {
            ctx.log(ActivityEvent::VerdictReplaced {
                scenario: name.clone(),
            });
            run.replaced.push(name);
        }
    }

    ctx.log(ActivityEvent::SuiteFinished {
        suite: suite.label().to_string(),
        total: run.report.len(),
        failed: run.report.failed_count(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
    Ok(run)
}

/// Run several suites into one report.
///
/// With `skip_missing`, a suite whose directory does not exist is listed in
/// [`SuiteRun::skipped`] instead of failing the run.
pub fn run_suites<F>(
    ctx: &HarnessContext,
    suites: &[SuiteKind],
    skip_missing: bool,
    mut observer: F,
) -> Result<SuiteRun>
where
    F: FnMut(&Verdict),
{
    let mut total = SuiteRun::default();
    for &suite in suites {
        match run_suite(ctx, suite, &mut observer) {
            Ok(run) => {
                total.replaced.extend(run.replaced);
                total.replaced.extend(total.report.merge(run.report));
            }
            Err(IshError::MissingScenarioDir { .. }) if skip_missing => total.skipped.push(suite),
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

fn verdict_event(verdict: &Verdict) -> ActivityEvent {
    ActivityEvent::VerdictRecorded {
        suite: verdict.suite.map(|s| s.label().to_string()),
        scenario: verdict.scenario.clone(),
        passed: verdict.passed,
        message: verdict.message.clone(),
        source: verdict.source.as_ref().map(|p| p.display().to_string()),
        digest: verdict.digest.clone(),
        duration_ms: verdict.duration_ms,
    }
}
