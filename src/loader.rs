//! Loading, validation, and selection of test suites.
//!
//! A suite document is a YAML or JSON sequence of test cases. Loading
//! resolves tool and job paths against the suite's directory and derives
//! a short name for each test; any structural problem is fatal before a
//! single test runs.

use crate::schema::{shortname, TestCase, TestId};
use std::fmt;
use std::path::Path;

/// A problem reading or validating a suite document.
#[derive(Debug)]
pub enum LoadError {
    /// The suite file could not be read.
    Io(std::io::Error),
    /// The document is not valid YAML/JSON or does not match the schema.
    Parse(serde_yaml::Error),
    /// The document parsed but is structurally unusable.
    Invalid(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "cannot read test suite: {e}"),
            LoadError::Parse(e) => write!(f, "invalid test suite document: {e}"),
            LoadError::Invalid(msg) => write!(f, "invalid test suite: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(e: serde_yaml::Error) -> Self {
        LoadError::Parse(e)
    }
}

/// Load a suite document and prepare its tests for execution.
pub fn load_suite(path: &Path) -> Result<Vec<TestCase>, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let mut tests: Vec<TestCase> = serde_yaml::from_str(&text)?;
    if tests.is_empty() {
        return Err(LoadError::Invalid(format!(
            "{} contains no tests",
            path.display()
        )));
    }

    let suite_dir = path.parent().unwrap_or_else(|| Path::new("."));
    for (i, test) in tests.iter_mut().enumerate() {
        test.short_name = derive_short_name(test, i);
        test.tool = resolve(&test.tool, suite_dir);
        if let Some(job) = &test.job {
            test.job = Some(resolve(job, suite_dir));
        }
    }
    Ok(tests)
}

/// Pick the short name for a test, warning about legacy identifier forms.
fn derive_short_name(test: &TestCase, index: usize) -> Option<String> {
    if let Some(label) = &test.label {
        eprintln!(
            "Test {}: the `label` field is deprecated, use `id` instead",
            index + 1
        );
        // A label is already a display name; only `id` URIs get trimmed.
        return Some(label.clone());
    }
    match &test.id {
        Some(TestId::Text(id)) => Some(shortname(id)),
        Some(TestId::Number(_)) => {
            eprintln!(
                "Test {}: identifier is an integer and cannot name the test",
                index + 1
            );
            None
        }
        None => {
            eprintln!("Test {} is missing an identifier", index + 1);
            None
        }
    }
}

/// Resolve a tool or job reference against the suite's directory.
/// Absolute paths and URIs pass through unchanged.
fn resolve(reference: &str, suite_dir: &Path) -> String {
    if reference.contains("://") || Path::new(reference).is_absolute() {
        return reference.to_string();
    }
    suite_dir.join(reference).display().to_string()
}

/// Parse a 1-based number-range expression like `1,3-6,9` into 0-based
/// test indices.
pub fn expand_number_range(expr: &str) -> Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo
                .trim()
                .parse()
                .map_err(|_| format!("invalid test range '{part}'"))?;
            let hi: usize = hi
                .trim()
                .parse()
                .map_err(|_| format!("invalid test range '{part}'"))?;
            if lo == 0 || hi < lo {
                return Err(format!("invalid test range '{part}'"));
            }
            indices.extend((lo - 1)..hi);
        } else {
            let n: usize = part
                .parse()
                .map_err(|_| format!("invalid test number '{part}'"))?;
            if n == 0 {
                return Err(format!("invalid test number '{part}'"));
            }
            indices.push(n - 1);
        }
    }
    Ok(indices)
}

/// Which tests of a suite to run. Number and name includes select the
/// union of both sets; excludes and tag filters then narrow it.
#[derive(Debug, Default)]
pub struct Selection {
    /// Run only tests carrying at least one of these tags.
    pub tags: Vec<String>,
    /// Skip tests carrying any of these tags.
    pub exclude_tags: Vec<String>,
    /// Run only these 0-based indices.
    pub include_numbers: Option<Vec<usize>>,
    /// Skip these 0-based indices.
    pub exclude_numbers: Vec<usize>,
    /// Run only tests with these short names.
    pub include_names: Vec<String>,
    /// Skip tests with these short names.
    pub exclude_names: Vec<String>,
}

impl Selection {
    fn admits(&self, index: usize, test: &TestCase) -> bool {
        let name = test.short_name.as_deref().unwrap_or("");
        // Number and name includes form a union: a test runs when either
        // selects it.
        if self.include_numbers.is_some() || !self.include_names.is_empty() {
            let by_number = self
                .include_numbers
                .as_ref()
                .is_some_and(|numbers| numbers.contains(&index));
            let by_name = self.include_names.iter().any(|n| n == name);
            if !by_number && !by_name {
                return false;
            }
        }
        if self.exclude_numbers.contains(&index) {
            return false;
        }
        if self.exclude_names.iter().any(|n| n == name) {
            return false;
        }
        let tags = test.effective_tags();
        if !self.tags.is_empty() && !tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if tags.iter().any(|t| self.exclude_tags.contains(t)) {
            return false;
        }
        true
    }
}

/// Apply a selection, keeping each surviving test's original 0-based
/// index for numbering and reporting.
pub fn select_tests(tests: Vec<TestCase>, selection: &Selection) -> Vec<(usize, TestCase)> {
    tests
        .into_iter()
        .enumerate()
        .filter(|(i, t)| selection.admits(*i, t))
        .collect()
}

/// All distinct tags across a suite, sorted.
pub fn all_tags(tests: &[TestCase]) -> Vec<String> {
    tests
        .iter()
        .flat_map(|t| t.effective_tags())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
}
