//! Aggregation of test results and report generation.
//!
//! Results are folded into global and per-tag counts, from which the
//! summary line, the JUnit XML report, and per-tag badge artifacts are
//! produced.

use crate::schema::{TestCase, TestResult, REQUIRED, UNSUPPORTED_FEATURE};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// The reporting category of one executed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Unsupported,
}

/// Re-derive the category from the recorded return code and tags. The
/// unsupported sentinel only lands in the unsupported bucket for tests
/// that are not required.
pub fn classify_outcome(return_code: i32, required: bool) -> Outcome {
    if return_code == 0 {
        Outcome::Passed
    } else if return_code == UNSUPPORTED_FEATURE && !required {
        Outcome::Unsupported
    } else {
        Outcome::Failed
    }
}

/// One test's identity as recorded in per-tag report buckets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Short name, or the description when no name could be derived.
    pub id: String,
    /// Effective tags of the test.
    pub tags: Vec<String>,
    /// Stable URI for the test within its suite.
    pub entry: String,
    /// Process description the test ran.
    pub tool: String,
    /// Input object, if any.
    pub job: Option<String>,
}

/// Global and per-tag totals over a finished run.
#[derive(Debug, Default)]
pub struct AggregateStats {
    pub total: usize,
    pub passed: usize,
    pub failures: usize,
    pub unsupported: usize,
    /// Tests seen per tag.
    pub ntotal: BTreeMap<String, usize>,
    /// Passed entries per tag, in encounter order.
    pub npassed: BTreeMap<String, Vec<ReportEntry>>,
    /// Failed entries per tag, in encounter order.
    pub nfailures: BTreeMap<String, Vec<ReportEntry>>,
    /// Unsupported entries per tag, in encounter order.
    pub nunsupported: BTreeMap<String, Vec<ReportEntry>>,
}

impl AggregateStats {
    /// The one-line human summary of the run.
    pub fn summary(&self) -> String {
        if self.failures == 0 && self.unsupported == 0 {
            "All tests passed".to_string()
        } else if self.failures == 0 {
            format!(
                "{} tests passed, {} unsupported features",
                self.passed, self.unsupported
            )
        } else {
            format!(
                "{} tests passed, {} failures, {} unsupported features",
                self.passed, self.failures, self.unsupported
            )
        }
    }

    /// Process exit code: zero unless at least one test failed.
    pub fn exit_code(&self) -> i32 {
        if self.failures > 0 { 1 } else { 0 }
    }
}

/// Fold ordered `(original_index, case, result)` triples into aggregate
/// statistics. The index is 0-based within the suite document.
pub fn aggregate<'a, I>(suite_name: &str, items: I) -> AggregateStats
where
    I: IntoIterator<Item = (usize, &'a TestCase, &'a TestResult)>,
{
    let mut stats = AggregateStats::default();
    for (index, test, result) in items {
        stats.total += 1;
        let tags = test.effective_tags();
        let entry = ReportEntry {
            id: test.display_name(),
            tags: tags.clone(),
            entry: format!("cwlharness:{}#{}", suite_name, index + 1),
            tool: test.tool.clone(),
            job: test.job.clone(),
        };

        let outcome = classify_outcome(result.return_code, test.is_required());
        match outcome {
            Outcome::Passed => stats.passed += 1,
            Outcome::Failed => stats.failures += 1,
            Outcome::Unsupported => stats.unsupported += 1,
        }
        for tag in tags {
            *stats.ntotal.entry(tag.clone()).or_default() += 1;
            let bucket = match outcome {
                Outcome::Passed => &mut stats.npassed,
                Outcome::Failed => &mut stats.nfailures,
                Outcome::Unsupported => &mut stats.nunsupported,
            };
            bucket.entry(tag).or_default().push(entry.clone());
        }
    }
    stats
}

/// Format a finished run as a JUnit XML document.
pub fn format_junit_xml(
    suite_name: &str,
    items: &[(usize, &TestCase, &TestResult)],
) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let tests = items.len();
    let failures = items
        .iter()
        .filter(|(_, t, r)| classify_outcome(r.return_code, t.is_required()) == Outcome::Failed)
        .count();
    let skipped = items
        .iter()
        .filter(|(_, t, r)| {
            classify_outcome(r.return_code, t.is_required()) == Outcome::Unsupported
        })
        .count();
    let total_time: Duration = items.iter().map(|(_, _, r)| r.duration).sum();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" skipped=\"{skipped}\" time=\"{:.3}\">",
        total_time.as_secs_f64()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{tests}\" failures=\"{failures}\" skipped=\"{skipped}\" time=\"{:.3}\">",
        escape_xml(suite_name),
        total_time.as_secs_f64()
    );

    for (_, test, result) in items {
        let classname = if result.classname.is_empty() {
            test.effective_tags().join(",")
        } else {
            result.classname.clone()
        };
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\">",
            escape_xml(&test.display_name()),
            escape_xml(&classname),
            result.duration.as_secs_f64()
        );

        match classify_outcome(result.return_code, test.is_required()) {
            Outcome::Failed => {
                let _ = writeln!(
                    xml,
                    "      <failure message=\"{}\">{}</failure>",
                    escape_xml(&result.message),
                    escape_xml(&result.message)
                );
            }
            Outcome::Unsupported => {
                xml.push_str("      <skipped/>\n");
            }
            Outcome::Passed => {}
        }

        if !result.stdout.is_empty() {
            let _ = writeln!(
                xml,
                "      <system-out>{}</system-out>",
                escape_xml(&result.stdout)
            );
        }
        if !result.stderr.is_empty() {
            let _ = writeln!(
                xml,
                "      <system-err>{}</system-err>",
                escape_xml(&result.stderr)
            );
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A shields.io-style badge document.
#[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
pub struct Badge {
    pub subject: String,
    pub status: String,
    pub color: String,
}

/// The badge for one tag: percentage of its tests passed, green when
/// everything passed, red for a broken `required` tag, yellow otherwise.
pub fn badge_for(tag: &str, stats: &AggregateStats) -> Badge {
    let total = stats.ntotal.get(tag).copied().unwrap_or(0);
    let passed = stats.npassed.get(tag).map_or(0, Vec::len);
    let percent = if total == 0 { 0 } else { passed * 100 / total };
    let color = if passed == total {
        "green"
    } else if tag == REQUIRED {
        "red"
    } else {
        "yellow"
    };
    Badge {
        subject: tag.to_string(),
        status: format!("{percent}%"),
        color: color.to_string(),
    }
}

/// Write per-tag badge JSON and Markdown listings into `badgedir`.
pub fn write_badges(badgedir: &Path, stats: &AggregateStats) -> std::io::Result<()> {
    std::fs::create_dir_all(badgedir)?;
    for tag in stats.ntotal.keys() {
        let badge = badge_for(tag, stats);
        let json = serde_json::to_string_pretty(&badge)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(badgedir.join(format!("{tag}.json")), json)?;
        std::fs::write(badgedir.join(format!("{tag}.md")), tag_markdown(tag, stats))?;
    }
    Ok(())
}

fn tag_markdown(tag: &str, stats: &AggregateStats) -> String {
    let total = stats.ntotal.get(tag).copied().unwrap_or(0);
    let mut md = String::new();
    let _ = writeln!(md, "# `{tag}` tag");
    let _ = writeln!(md);
    let empty = Vec::new();
    for (heading, bucket) in [
        ("Passed", stats.npassed.get(tag).unwrap_or(&empty)),
        ("Failed", stats.nfailures.get(tag).unwrap_or(&empty)),
        ("Unsupported", stats.nunsupported.get(tag).unwrap_or(&empty)),
    ] {
        let _ = writeln!(md, "## {heading} {} of {total}", bucket.len());
        let _ = writeln!(md);
        for entry in bucket {
            match &entry.job {
                Some(job) => {
                    let _ =
                        writeln!(md, "- [{}]({}) ({}, {job})", entry.id, entry.entry, entry.tool);
                }
                None => {
                    let _ = writeln!(md, "- [{}]({}) ({})", entry.id, entry.entry, entry.tool);
                }
            }
        }
        let _ = writeln!(md);
    }
    md
}
