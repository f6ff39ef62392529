//! Assembly of the runner command line for one test.
//!
//! Every test gets a fresh output directory; directory creation is
//! serialized through the allocator so concurrent workers never race on
//! temp-dir naming.

use crate::schema::{RunnerConfig, TestCase};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Hands out unique per-test output directories.
pub struct OutdirAllocator {
    lock: Mutex<()>,
    base: Option<PathBuf>,
}

impl OutdirAllocator {
    /// Allocate under `base`, or the system temp directory when `None`.
    pub fn new(base: Option<PathBuf>) -> Self {
        OutdirAllocator {
            lock: Mutex::new(()),
            base,
        }
    }

    /// Create a fresh output directory and return its path. The directory
    /// is not removed on drop; the executor cleans it up after the test.
    pub fn allocate(&self) -> std::io::Result<PathBuf> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut builder = tempfile::Builder::new();
        let dir = match &self.base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.prefix("cwlharness").tempdir_in(base)?
            }
            None => builder.prefix("cwlharness").tempdir()?,
        };
        Ok(dir.keep())
    }
}

/// Strip a `file://` prefix and make the path relative to `cwd` when it
/// lies underneath it, so command lines stay short and portable.
fn relativize(path: &str, cwd: &Path) -> String {
    let plain = path.strip_prefix("file://").unwrap_or(path);
    match Path::new(plain).strip_prefix(cwd) {
        Ok(rel) => rel.display().to_string(),
        Err(_) => plain.to_string(),
    }
}

/// Build the argument vector for one test and allocate its output
/// directory. Returns the full command line (program first) and the
/// output directory path.
pub fn prepare_test_command(
    config: &RunnerConfig,
    allocator: &OutdirAllocator,
    test: &TestCase,
    cwd: &Path,
) -> std::io::Result<(Vec<String>, PathBuf)> {
    let mut args = vec![config.tool.clone()];
    args.extend(config.args.iter().cloned());

    for testarg in &config.testargs {
        if let Some(value) = test.field(&testarg.field) {
            args.push(testarg.flag.clone());
            args.push(value);
        }
    }

    let outdir = allocator.allocate()?;
    args.push(format!("--outdir={}", outdir.display()));
    if !config.junit_verbose {
        args.push("--quiet".to_string());
    }

    args.push(relativize(&test.tool, cwd));
    if let Some(job) = &test.job {
        args.push(relativize(job, cwd));
    }

    Ok((args, outdir))
}
