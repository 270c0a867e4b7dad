//! Integration tests for the `npmres` binary.
//!
//! The binary runs with the local runner against the fake resource scripts
//! from `npmres-test-utils`, with a throw-away config home so no user
//! config file is picked up.

#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output};

use npmres_core::config;
use npmres_core::feature::Step;
use npmres_test_utils::{CORRECT_TOKEN, INCORRECT_TOKEN, REGISTRY_URI, TestHarness};

fn npmres(harness: &TestHarness, home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_npmres"));
    cmd.env("XDG_CONFIG_HOME", home)
        .env(config::ENV_REGISTRY, REGISTRY_URI)
        .env(config::ENV_CORRECT_CREDENTIALS, CORRECT_TOKEN)
        .env(config::ENV_INCORRECT_CREDENTIALS, INCORRECT_TOKEN)
        .env(config::ENV_RUNNER, "local")
        .env(config::ENV_RESOURCE_DIR, harness.resource.dir())
        .env(config::ENV_SCRATCH_ROOT, harness.scratch_root())
        .env_remove(config::ENV_DOCKER_IMAGE)
        .env_remove(config::ENV_STEP_TIMEOUT)
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const CHECK_FEATURE: &str = r#"
Feature: check
  Scenario: latest version
    Given a source configuration for package "left-pad"
    When the resource is checked
    Then version "1.3.0" is returned
"#;

#[test]
fn steps_lists_the_vocabulary() {
    let harness = TestHarness::new().unwrap();
    let home = tempfile::TempDir::new().unwrap();

    let output = npmres(&harness, home.path()).arg("steps").output().unwrap();

    assert!(output.status.success());
    let listed = stdout(&output);
    assert_eq!(listed.lines().count(), Step::vocabulary().len());
    assert!(listed.contains("the resource is checked"));
}

#[test]
fn run_passes_and_writes_report() {
    let harness = TestHarness::new().unwrap();
    harness.registry.publish("left-pad", "1.3.0").unwrap();
    let home = tempfile::TempDir::new().unwrap();
    let feature = home.path().join("check.feature");
    std::fs::write(&feature, CHECK_FEATURE).unwrap();
    let report = home.path().join("report.json");

    let output = npmres(&harness, home.path())
        .arg("run")
        .arg(&feature)
        .arg("--report")
        .arg(&report)
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout(&output),
        stderr(&output)
    );
    assert!(stdout(&output).contains("PASS     latest version"));
    assert!(stdout(&output).contains("1 scenario (1 passed, 0 failed)"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["passed"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["features"][0]["feature"], "check");
    assert_eq!(report["features"][0]["scenarios"][0]["status"], "passed");
}

#[test]
fn run_exits_nonzero_on_failed_scenario() {
    let harness = TestHarness::new().unwrap();
    // Nothing published: check reports an empty list.
    let home = tempfile::TempDir::new().unwrap();
    let feature = home.path().join("check.feature");
    std::fs::write(&feature, CHECK_FEATURE).unwrap();

    let output = npmres(&harness, home.path())
        .arg("run")
        .arg(&feature)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("FAIL     latest version"), "stdout: {out}");
    assert!(out.contains("line 6: Then version \"1.3.0\" is returned"), "stdout: {out}");
}

#[test]
fn run_aborts_on_missing_configuration() {
    let harness = TestHarness::new().unwrap();
    let home = tempfile::TempDir::new().unwrap();
    let feature = home.path().join("check.feature");
    std::fs::write(&feature, CHECK_FEATURE).unwrap();

    let output = npmres(&harness, home.path())
        .env_remove(config::ENV_REGISTRY)
        .arg("run")
        .arg(&feature)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("TEST_REGISTRY is undefined"),
        "stderr: {}",
        stderr(&output)
    );
    assert!(!stdout(&output).contains("Feature:"));
}

#[test]
fn run_rejects_unparseable_feature() {
    let harness = TestHarness::new().unwrap();
    let home = tempfile::TempDir::new().unwrap();
    let feature = home.path().join("bad.feature");
    std::fs::write(&feature, "Feature: bad\n  Scenario: x\n    Given nonsense\n").unwrap();

    let output = npmres(&harness, home.path())
        .arg("run")
        .arg(&feature)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("line 3"), "stderr: {}", stderr(&output));
}

#[test]
fn invoke_prints_resource_output() {
    let harness = TestHarness::new().unwrap();
    harness.registry.publish("left-pad", "1.2.3").unwrap();
    let home = tempfile::TempDir::new().unwrap();
    let request = home.path().join("request.json");
    std::fs::write(
        &request,
        r#"{"source":{"package":"left-pad"},"version":{"version":"1.2.3"}}"#,
    )
    .unwrap();
    let dir = home.path().join("volume");
    std::fs::create_dir(&dir).unwrap();

    let output = npmres(&harness, home.path())
        .args(["invoke", "in", "--request"])
        .arg(&request)
        .arg("--dir")
        .arg(&dir)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("exit code: 0"), "stdout: {out}");
    assert!(out.contains(r#""version":{"version":"1.2.3"}"#), "stdout: {out}");
    assert_eq!(std::fs::read_to_string(dir.join("version")).unwrap(), "1.2.3\n");
}

#[test]
fn init_writes_config_once() {
    let harness = TestHarness::new().unwrap();
    let home = tempfile::TempDir::new().unwrap();
    let path = home.path().join("npmres").join("config.toml");

    let first = npmres(&harness, home.path())
        .arg("--config")
        .arg(&path)
        .args(["init", "--registry", "http://verdaccio.test:4873"])
        .output()
        .unwrap();
    assert!(first.status.success(), "stderr: {}", stderr(&first));

    let written = config::load_config(&path).unwrap();
    assert_eq!(
        written.registry.uri.as_deref(),
        Some("http://verdaccio.test:4873")
    );
    assert_eq!(written.runner.mode.as_deref(), Some("docker"));

    let second = npmres(&harness, home.path())
        .arg("--config")
        .arg(&path)
        .arg("init")
        .output()
        .unwrap();
    assert!(!second.status.success());
    assert!(stderr(&second).contains("already exists"));

    let forced = npmres(&harness, home.path())
        .arg("--config")
        .arg(&path)
        .args(["init", "--force"])
        .output()
        .unwrap();
    assert!(forced.status.success());
}
