//! Conformance-test harness for CWL runners.
//!
//! A suite document describes test cases; each case names a process
//! description, an optional input object, and the expected output. The
//! harness spawns the runner under test once per case, compares the JSON
//! it prints against the expectation, and aggregates the outcomes into
//! summaries, JUnit XML, and badge artifacts.

pub mod command;
pub mod compare;
pub mod fsaccess;
pub mod loader;
pub mod report;
pub mod runner;
pub mod schema;

use report::AggregateStats;
use schema::{RunnerConfig, TestCase, TestResult};
use std::sync::atomic::AtomicBool;

/// Everything a finished (or cancelled) run produced.
#[derive(Debug)]
pub struct SuiteOutcome {
    /// `(original_index, case, result)` in suite order. Cancelled tests
    /// have no entry.
    pub results: Vec<(usize, TestCase, TestResult)>,
    /// Aggregated counts over `results`.
    pub stats: AggregateStats,
    /// Whether the run was cancelled before finishing.
    pub interrupted: bool,
    /// A spawn-level problem that aborted the run, if any.
    pub fatal: Option<String>,
}

/// Run the selected tests of a suite and aggregate the results.
///
/// `tests` carries each case's 0-based index in the suite document so
/// reports stay stable under selection.
pub fn run_suite(
    config: &RunnerConfig,
    suite_name: &str,
    tests: Vec<(usize, TestCase)>,
    jobs: usize,
    cancel: &AtomicBool,
) -> SuiteOutcome {
    let outcome = runner::run_all(config, &tests, jobs, cancel);
    let mut results = Vec::with_capacity(outcome.results.len());
    for (pos, result) in outcome.results {
        let (index, test) = &tests[pos];
        results.push((*index, test.clone(), result));
    }
    let stats = report::aggregate(suite_name, results.iter().map(|(i, t, r)| (*i, t, r)));
    SuiteOutcome {
        results,
        stats,
        interrupted: outcome.interrupted,
        fatal: outcome.fatal,
    }
}
