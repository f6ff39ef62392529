//! Test execution engine.
//!
//! Spawns the runner under test once per test case, enforces the per-test
//! timeout, classifies the outcome, and verifies the output object against
//! the expectation. `run_all` drives a bounded worker pool and restores
//! submission order on the collected results.

use crate::command::{prepare_test_command, OutdirAllocator};
use crate::compare::Comparator;
use crate::fsaccess::StdFsAccess;
use crate::schema::{RunnerConfig, TestCase, TestResult, TIMEOUT_CODE, UNSUPPORTED_FEATURE};
use serde_json::Value;
use std::fmt;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// A condition that prevents a test from producing a result.
#[derive(Debug)]
pub enum RunError {
    /// The run was cancelled before or during this test.
    Interrupted,
    /// The runner process could not be started or waited on.
    Spawn(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Interrupted => write!(f, "interrupted"),
            RunError::Spawn(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Run a single test to completion.
///
/// Every completed execution yields a `TestResult`, including timeouts,
/// comparison failures, and unsupported features. Only cancellation and
/// spawn problems surface as errors.
pub fn run_test(
    config: &RunnerConfig,
    allocator: &OutdirAllocator,
    test: &TestCase,
    test_number: usize,
    total: usize,
    cancel: &AtomicBool,
) -> Result<TestResult, RunError> {
    if cancel.load(Ordering::SeqCst) {
        return Err(RunError::Interrupted);
    }

    let doc = test.doc_line();
    if doc.is_empty() {
        eprintln!("Test [{test_number}/{total}] {}", test.display_name());
    } else {
        eprintln!("Test [{test_number}/{total}] {}: {doc}", test.display_name());
    }

    let cwd = std::env::current_dir()
        .map_err(|e| RunError::Spawn(format!("cannot determine working directory: {e}")))?;
    let (args, outdir) = prepare_test_command(config, allocator, test, &cwd)
        .map_err(|e| RunError::Spawn(format!("cannot create output directory: {e}")))?;

    let start = Instant::now();
    let mut cmd = Command::new(&args[0]);
    cmd.args(&args[1..]).stdin(Stdio::null()).stdout(Stdio::piped());
    if config.verbose {
        cmd.stderr(Stdio::inherit());
    } else {
        cmd.stderr(Stdio::piped());
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = std::fs::remove_dir_all(&outdir);
            return Err(RunError::Spawn(format!("failed to run {}: {e}", args[0])));
        }
    };

    let timeout = Duration::from_secs(config.timeout);
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if cancel.load(Ordering::SeqCst) {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = std::fs::remove_dir_all(&outdir);
                    return Err(RunError::Interrupted);
                }
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    timed_out = true;
                    break None;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_dir_all(&outdir);
                return Err(RunError::Spawn(format!("failed to wait for {}: {e}", args[0])));
            }
        }
    };

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(e) => {
            let _ = std::fs::remove_dir_all(&outdir);
            return Err(RunError::Spawn(format!(
                "failed to read output of {}: {e}",
                args[0]
            )));
        }
    };
    let duration = start.elapsed();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let result = if timed_out {
        // A timeout overrides should_fail: a runner that hangs is broken
        // even when a failure was expected.
        TestResult::new(TIMEOUT_CODE, stdout, stderr, duration, &config.classname)
            .with_message("Test timed out")
    } else {
        let code = status.map_or(-1, |s| s.code().unwrap_or(-1));
        classify(config, test, code, stdout, stderr, duration)
    };

    let _ = std::fs::remove_dir_all(&outdir);
    Ok(result)
}

/// Turn a finished runner process into a result, applying the unsupported
/// sentinel, `should_fail` inversion, and output comparison in that order.
fn classify(
    config: &RunnerConfig,
    test: &TestCase,
    code: i32,
    stdout: String,
    stderr: String,
    duration: Duration,
) -> TestResult {
    let make = |rc: i32| {
        TestResult::new(
            rc,
            stdout.clone(),
            stderr.clone(),
            duration,
            &config.classname,
        )
    };

    if code == UNSUPPORTED_FEATURE {
        if test.is_required() {
            return make(1).with_message("Required feature is not supported");
        }
        return make(UNSUPPORTED_FEATURE);
    }

    if test.should_fail {
        if code == 0 {
            return make(1).with_message("Returned zero but it should be non-zero");
        }
        return make(0);
    }

    if code != 0 {
        return make(1).with_message(format!("Returned non-zero exit code {code}"));
    }

    // An empty stdout counts as an empty output object.
    let text = if stdout.trim().is_empty() {
        "{}"
    } else {
        stdout.as_str()
    };
    let actual: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return make(1).with_message(format!("Output is not a valid JSON document: {e}")),
    };

    let expected = test.output.clone().unwrap_or(Value::Null);
    let comparator = Comparator::new(Box::new(StdFsAccess::new(
        config.basedir.display().to_string(),
    )));
    match comparator.compare(&expected, &actual, false) {
        Ok(()) => make(0),
        Err(err) => make(1).with_message(err.to_string()),
    }
}

/// The collected outcome of a whole run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Per-test results keyed by position in the submitted slice, sorted
    /// back into submission order. Cancelled tests have no entry.
    pub results: Vec<(usize, TestResult)>,
    /// Whether the run was cancelled before finishing.
    pub interrupted: bool,
    /// A spawn-level problem that aborted the run, if any.
    pub fatal: Option<String>,
}

/// Run the selected tests on a pool of `jobs` worker threads.
///
/// Each submitted test is `(original_index, case)`; the original index is
/// kept for reporting while progress numbering follows run order. Setting
/// `cancel` stops submission and lets in-flight tests wind down; their
/// completed results are kept.
pub fn run_all(
    config: &RunnerConfig,
    tests: &[(usize, TestCase)],
    jobs: usize,
    cancel: &AtomicBool,
) -> RunOutcome {
    let allocator = OutdirAllocator::new(config.outdir_base.clone());
    let total = tests.len();
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &TestCase)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();

    let mut results = Vec::with_capacity(total);
    let mut interrupted = false;
    let mut fatal = None;

    thread::scope(|scope| {
        for _ in 0..jobs.max(1) {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let allocator = &allocator;
            scope.spawn(move || {
                while let Ok((pos, test)) = job_rx.recv() {
                    let outcome = run_test(config, allocator, test, pos + 1, total, cancel);
                    if result_tx.send((pos, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for (pos, (_, test)) in tests.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            if job_tx.send((pos, test)).is_err() {
                break;
            }
        }
        drop(job_tx);

        for (pos, outcome) in result_rx.iter() {
            match outcome {
                Ok(result) => results.push((pos, result)),
                Err(RunError::Interrupted) => interrupted = true,
                Err(RunError::Spawn(msg)) => {
                    // A runner that cannot start will not start for the
                    // remaining tests either.
                    if fatal.is_none() {
                        fatal = Some(msg);
                    }
                    cancel.store(true, Ordering::SeqCst);
                }
            }
        }
    });

    if cancel.load(Ordering::SeqCst) && fatal.is_none() {
        interrupted = true;
    }
    results.sort_by_key(|(pos, _)| *pos);
    RunOutcome {
        results,
        interrupted,
        fatal,
    }
}
