//! Schema definitions for conformance test suites.
//!
//! A suite is a YAML (or JSON) document containing a list of test cases.
//! Each case names a process description, an optional input job, and the
//! expected output object. Suites are validated against these types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved exit code meaning "valid test, but the runner does not
/// support the required feature".
pub const UNSUPPORTED_FEATURE: i32 = 33;

/// Exit code recorded for a test whose runner exceeded the timeout.
pub const TIMEOUT_CODE: i32 = 2;

/// The implicit tag carried by tests that declare no tags at all.
pub const REQUIRED: &str = "required";

/// Default per-test timeout in seconds (10 minutes).
pub const DEFAULT_TIMEOUT: u64 = 600;

/// Test identity as written in the suite document.
///
/// String identifiers are the supported form; integer identifiers are
/// accepted for legacy suites but cannot produce a short name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TestId {
    /// A string identifier, usually a URI fragment.
    Text(String),
    /// A bare integer identifier (legacy suites).
    Number(i64),
}

/// A single conformance test case.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestCase {
    /// URI or path of the process description to run.
    pub tool: String,

    /// URI or path of the input object, if any.
    #[serde(default)]
    pub job: Option<String>,

    /// Human-readable description of what the test checks.
    #[serde(default)]
    pub doc: Option<String>,

    /// Expected output object. The literal string `"Any"` skips comparison.
    #[serde(default)]
    pub output: Option<serde_json::Value>,

    /// Tags for this test. A test with no `tags` field is implicitly
    /// tagged `required`; an explicit empty list is not.
    #[serde(default)]
    pub tags: Option<Vec<String>>,

    /// When true, the runner is expected to exit nonzero.
    #[serde(default)]
    pub should_fail: bool,

    /// Test identifier.
    #[serde(default)]
    pub id: Option<TestId>,

    /// Deprecated name field; takes precedence over `id` for short names.
    #[serde(default)]
    pub label: Option<String>,

    /// Derived short name, filled in by the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,

    /// Any further fields, kept verbatim so `--test-arg name==flag`
    /// mappings can reference suite-specific keys.
    #[serde(flatten)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

impl TestCase {
    /// The tags to use for classification and aggregation.
    ///
    /// A missing `tags` field means the test is `required`.
    pub fn effective_tags(&self) -> Vec<String> {
        match &self.tags {
            Some(tags) => tags.clone(),
            None => vec![REQUIRED.to_string()],
        }
    }

    /// Whether a sentinel exit must be treated as a hard failure.
    pub fn is_required(&self) -> bool {
        self.effective_tags().iter().any(|t| t == REQUIRED)
    }

    /// The description collapsed to a single trimmed line.
    pub fn doc_line(&self) -> String {
        self.doc
            .as_deref()
            .unwrap_or("")
            .replace('\n', " ")
            .trim()
            .to_string()
    }

    /// Look up a string-valued field by name, for `--test-arg` mappings.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "tool" => Some(self.tool.clone()),
            "job" => self.job.clone(),
            "doc" => self.doc.clone(),
            "label" => self.label.clone(),
            _ => match self.extensions.get(name) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            },
        }
    }

    /// A display name for listings and report entries: the short name if
    /// one was derived, otherwise the description.
    pub fn display_name(&self) -> String {
        match &self.short_name {
            Some(name) => name.clone(),
            None => self.doc_line(),
        }
    }
}

/// Return the short name of an identifier: the last nonempty segment
/// after splitting on `/` and `#`.
pub fn shortname(name: &str) -> String {
    name.split(['/', '#'])
        .filter(|n| !n.is_empty())
        .next_back()
        .unwrap_or(name)
        .to_string()
}

/// A `name==flag` mapping from a test-case field to a runner flag.
#[derive(Debug, Clone, PartialEq)]
pub struct TestArg {
    /// Test-case field to look up.
    pub field: String,
    /// Flag to pass before the field's value.
    pub flag: String,
}

impl TestArg {
    /// Parse a `name==flag` argument. Returns `None` unless the string
    /// contains exactly one `==` separator.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split("==");
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(flag), None) if !field.is_empty() && !flag.is_empty() => {
                Some(TestArg {
                    field: field.to_string(),
                    flag: flag.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Configuration for invoking the runner under test.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Runner executable.
    pub tool: String,

    /// Arguments passed to the runner before any per-test flags.
    pub args: Vec<String>,

    /// Per-test `name==flag` mappings.
    pub testargs: Vec<TestArg>,

    /// Base directory test paths are resolved against.
    pub basedir: std::path::PathBuf,

    /// Parent directory for per-test output directories. `None` uses the
    /// system temp directory.
    pub outdir_base: Option<std::path::PathBuf>,

    /// Per-test wall-clock timeout in seconds.
    pub timeout: u64,

    /// Show runner stderr live instead of capturing it.
    pub verbose: bool,

    /// Keep the runner chatty (do not pass `--quiet`) so captured output
    /// is more useful in reports.
    pub junit_verbose: bool,

    /// Class name recorded on every result, for report consumers.
    pub classname: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            tool: "cwl-runner".to_string(),
            args: vec![],
            testargs: vec![],
            basedir: std::path::PathBuf::from("."),
            outdir_base: None,
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
            junit_verbose: false,
            classname: String::new(),
        }
    }
}

/// The immutable outcome of one test execution.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    /// 0 for pass, 1 for fail, 2 for timeout, 33 for unsupported.
    pub return_code: i32,

    /// Captured runner stdout.
    pub stdout: String,

    /// Captured runner stderr (empty when stderr was inherited).
    pub stderr: String,

    /// Wall-clock duration of the runner process.
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,

    /// Class name from the runner configuration.
    pub classname: String,

    /// Failure detail, empty on success.
    pub message: String,
}

impl TestResult {
    /// Create a result with no failure message.
    pub fn new(
        return_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
        classname: &str,
    ) -> Self {
        TestResult {
            return_code,
            stdout,
            stderr,
            duration,
            classname: classname.to_string(),
            message: String::new(),
        }
    }

    /// Attach a failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Generate the JSON Schema for suite documents.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Vec<TestCase>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_case() {
        let yaml = r#"
- tool: echo.cwl
  output:
    out: hello
"#;
        let tests: Vec<TestCase> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].tool, "echo.cwl");
        assert!(tests[0].job.is_none());
        assert!(!tests[0].should_fail);
        assert_eq!(tests[0].output, Some(serde_json::json!({"out": "hello"})));
    }

    #[test]
    fn parse_full_case() {
        let yaml = r#"
- tool: wc.cwl
  job: wc-job.json
  doc: |
    Count words,
    multi-lined doc.
  output: Any
  tags: [command_line_tool, shell]
  should_fail: true
  id: https://w3id.org/cwl/tests#wc_test
"#;
        let tests: Vec<TestCase> = serde_yaml::from_str(yaml).unwrap();
        let t = &tests[0];
        assert_eq!(t.job.as_deref(), Some("wc-job.json"));
        assert_eq!(t.doc_line(), "Count words, multi-lined doc.");
        assert_eq!(t.output, Some(serde_json::json!("Any")));
        assert!(t.should_fail);
        assert_eq!(
            t.id,
            Some(TestId::Text(
                "https://w3id.org/cwl/tests#wc_test".to_string()
            ))
        );
        assert!(!t.is_required());
    }

    #[test]
    fn missing_tool_is_rejected() {
        let yaml = r#"
- doc: no tool here
"#;
        let result: Result<Vec<TestCase>, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn integer_id_is_tolerated() {
        let yaml = r#"
- tool: t.cwl
  id: 42
"#;
        let tests: Vec<TestCase> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tests[0].id, Some(TestId::Number(42)));
    }

    #[test]
    fn absent_tags_imply_required() {
        let yaml = r#"
- tool: a.cwl
- tool: b.cwl
  tags: [optional]
- tool: c.cwl
  tags: []
"#;
        let tests: Vec<TestCase> = serde_yaml::from_str(yaml).unwrap();
        assert!(tests[0].is_required());
        assert_eq!(tests[0].effective_tags(), vec!["required"]);
        assert!(!tests[1].is_required());
        // An explicit empty list is preserved, not defaulted.
        assert!(!tests[2].is_required());
        assert!(tests[2].effective_tags().is_empty());
    }

    #[test]
    fn extension_fields_are_kept() {
        let yaml = r#"
- tool: t.cwl
  cachedir: /tmp/cache
"#;
        let tests: Vec<TestCase> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tests[0].field("cachedir"), Some("/tmp/cache".to_string()));
        assert_eq!(tests[0].field("tool"), Some("t.cwl".to_string()));
        assert_eq!(tests[0].field("nope"), None);
    }

    #[test]
    fn shortname_takes_last_segment() {
        assert_eq!(
            shortname("https://example.com/tests#echo_test"),
            "echo_test"
        );
        assert_eq!(shortname("tests/echo_test"), "echo_test");
        assert_eq!(shortname("plain"), "plain");
        assert_eq!(shortname("trailing/#"), "trailing");
    }

    #[test]
    fn testarg_parsing() {
        assert_eq!(
            TestArg::parse("cache==--cache-dir"),
            Some(TestArg {
                field: "cache".to_string(),
                flag: "--cache-dir".to_string(),
            })
        );
        assert_eq!(TestArg::parse("no-separator"), None);
        assert_eq!(TestArg::parse("too==many==parts"), None);
        assert_eq!(TestArg::parse("==flag"), None);
    }

    #[test]
    fn schema_generation() {
        let schema = generate_schema();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "array");
    }
}
