//! Integration tests driving the binary against fake runners.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::time::Instant;
use tempfile::TempDir;

fn harness_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cwlharness"))
}

/// A fake runner that executes the tool file as a shell script, so each
/// test case controls its own exit code and stdout.
fn fake_runner(dir: &Path) -> String {
    let path = dir.join("runner.sh");
    fs::write(
        &path,
        "#!/bin/sh\nfor arg in \"$@\"; do last=\"$arg\"; done\nexec sh \"$last\"\n",
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

fn write_tool(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

#[test]
fn passing_suite_exits_zero() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    write_tool(dir.path(), "echo.cwl", r#"printf '{"out": "hello"}'"#);
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: echo.cwl
  id: "#echo_test"
  doc: prints hello
  output:
    out: hello
"##,
    )
    .unwrap();

    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("Test [1/1] echo_test: prints hello"));
    assert!(stderr.contains("All tests passed"));
}

#[test]
fn failing_suite_exits_one_with_details() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    write_tool(dir.path(), "bad.cwl", r#"printf '{"out": "goodbye"}'"#);
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: bad.cwl
  id: "#bad_test"
  output:
    out: hello
"##,
    )
    .unwrap();

    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad_test failed"));
    assert!(stderr.contains("expected:"));
    assert!(stderr.contains("0 tests passed, 1 failures, 0 unsupported features"));
}

#[test]
fn unsupported_feature_warns_but_passes() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    write_tool(dir.path(), "ok.cwl", r#"printf '{}'"#);
    write_tool(dir.path(), "unsup.cwl", "exit 33");
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: ok.cwl
  id: "#ok_test"
  output: {}
- tool: unsup.cwl
  id: "#unsup_test"
  tags: [optional_feature]
"##,
    )
    .unwrap();

    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 tests passed, 1 unsupported features"));
}

#[test]
fn parallel_jobs_give_speedup() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    let mut suite = String::new();
    for i in 0..4 {
        write_tool(
            dir.path(),
            &format!("slow{i}.cwl"),
            "sleep 0.4\nprintf '{}'",
        );
        suite.push_str(&format!(
            "- tool: slow{i}.cwl\n  id: \"#slow{i}\"\n  output: {{}}\n"
        ));
    }
    fs::write(dir.path().join("suite.yml"), suite).unwrap();

    let start = Instant::now();
    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .arg("-j")
        .arg("4")
        .output()
        .unwrap();
    let elapsed = start.elapsed();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    // Serial execution would need ~1.6s. Generous bound against load.
    assert!(
        elapsed.as_secs_f64() < 1.3,
        "4 tests took {:.2}s with -j 4",
        elapsed.as_secs_f64()
    );
}

#[test]
fn junit_and_badges_are_written() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    write_tool(dir.path(), "ok.cwl", r#"printf '{}'"#);
    write_tool(dir.path(), "bad.cwl", "exit 1");
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: ok.cwl
  id: "#ok_test"
  tags: [required]
  output: {}
- tool: bad.cwl
  id: "#bad_test"
  tags: [required]
  output: {}
"##,
    )
    .unwrap();

    let junit = dir.path().join("report.xml");
    let badgedir = dir.path().join("badges");
    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .arg("--junit-xml")
        .arg(&junit)
        .arg("--badgedir")
        .arg(&badgedir)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));

    let xml = fs::read_to_string(&junit).unwrap();
    assert!(xml.contains("<testsuite name=\"suite.yml\" tests=\"2\" failures=\"1\""));
    assert!(xml.contains("<testcase name=\"ok_test\""));
    assert!(xml.contains("<failure message="));

    let badge = fs::read_to_string(badgedir.join("required.json")).unwrap();
    assert!(badge.contains("\"subject\": \"required\""));
    assert!(badge.contains("\"status\": \"50%\""));
    assert!(badge.contains("\"color\": \"red\""));
    assert!(badgedir.join("required.md").is_file());
}

#[test]
fn number_selection_runs_a_subset() {
    let dir = TempDir::new().unwrap();
    let runner = fake_runner(dir.path());
    write_tool(dir.path(), "ok.cwl", r#"printf '{}'"#);
    write_tool(dir.path(), "bad.cwl", "exit 1");
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: bad.cwl
  id: "#first"
  output: {}
- tool: ok.cwl
  id: "#second"
  output: {}
"##,
    )
    .unwrap();

    // Only the second (passing) test runs, so the suite passes.
    let output = harness_cmd()
        .arg("run")
        .arg(dir.path().join("suite.yml"))
        .arg("--tool")
        .arg(&runner)
        .arg("-n")
        .arg("2")
        .output()
        .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("Test [1/1] second"));
    assert!(!stderr.contains("first"));
}

#[test]
fn list_tags_and_validate_subcommands() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("suite.yml"),
        r##"
- tool: a.cwl
  id: "#alpha"
  doc: first test
  tags: [command_line_tool]
- tool: b.cwl
  id: "#beta"
"##,
    )
    .unwrap();
    let suite = dir.path().join("suite.yml");

    let output = harness_cmd().arg("list").arg(&suite).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[1] alpha: first test"));
    assert!(stdout.contains("[2] beta"));

    let output = harness_cmd().arg("tags").arg(&suite).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("command_line_tool"));
    assert!(stdout.contains("required"));

    let output = harness_cmd().arg("validate").arg(&suite).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("is valid (2 tests)"));

    // A structurally broken suite fails validation.
    fs::write(dir.path().join("broken.yml"), "- doc: no tool\n").unwrap();
    let output = harness_cmd()
        .arg("validate")
        .arg(dir.path().join("broken.yml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn schema_subcommand_emits_json_schema() {
    let output = harness_cmd().arg("schema").output().unwrap();
    assert!(output.status.success());
    let schema: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("schema is valid JSON");
    assert_eq!(schema["type"], "array");
}
