//! CLI tests for Cloudlab
//!
//! This test suite covers:
//! - Argument parsing and help output
//! - synth, diff, plan, list, validate and init end to end
//! - JSON output mode
//! - Exit codes for invalid configuration

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::{tempdir, TempDir};

// Helper to get a command running in an isolated directory
fn cloudlab_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cloudlab").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("CLOUDLAB_CONFIG")
        .env_remove("CLOUDLAB_REGION")
        .env_remove("CLOUDLAB_ACCOUNT")
        .env_remove("CLOUDLAB_OUTPUT_DIR")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

fn workspace() -> TempDir {
    tempdir().unwrap()
}

// ============================================================================
// Basic Tests
// ============================================================================

#[test]
fn test_help() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_version() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand() {
    let dir = workspace();
    cloudlab_cmd(dir.path()).arg("deploy-everything").assert().failure();
}

// ============================================================================
// Synth Tests
// ============================================================================

#[test]
fn test_synth_writes_assembly() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("CdkLabNetworkStack"));

    let out = dir.path().join("cdk.out");
    assert!(out.join("manifest.json").exists());
    assert!(out.join("CdkLabWebServerStack.template.json").exists());
}

#[test]
fn test_synth_single_stack_to_stdout() {
    let dir = workspace();
    let output = cloudlab_cmd(dir.path())
        .args(["synth", "--stack", "CdkLabWebServerStack"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let template: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let instances = template["Resources"]
        .as_object()
        .unwrap()
        .values()
        .filter(|r| r["Type"] == "AWS::EC2::Instance")
        .count();
    assert_eq!(instances, 2);
    assert!(!dir.path().join("cdk.out").exists());
}

#[test]
fn test_synth_unknown_stack() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .args(["synth", "--stack", "Nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Stack 'Nope' not found"));
}

#[test]
fn test_synth_json_summary() {
    let dir = workspace();
    let output = cloudlab_cmd(dir.path())
        .args(["synth", "--output", "out", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["stacks"].as_array().unwrap().len(), 2);
    assert!(dir.path().join("out").join("manifest.json").exists());
}

// ============================================================================
// Diff and Plan Tests
// ============================================================================

#[test]
fn test_diff_after_synth_is_clean() {
    let dir = workspace();
    cloudlab_cmd(dir.path()).arg("synth").assert().success();
    cloudlab_cmd(dir.path())
        .args(["diff", "--fail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("There were no differences"));
}

#[test]
fn test_diff_detects_region_change() {
    let dir = workspace();
    cloudlab_cmd(dir.path()).arg("synth").assert().success();
    cloudlab_cmd(dir.path())
        .args(["--region", "eu-west-1", "diff", "--fail"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("AWS::EC2::Subnet"))
        .stdout(predicate::str::contains("requires replacement"));
}

#[test]
fn test_diff_without_previous_assembly() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("diff")
        .assert()
        .success()
        .stderr(predicate::str::contains("every stack is new"))
        .stdout(predicate::str::contains("[+] AWS::EC2::VPC"));
}

#[test]
fn test_plan_json() {
    let dir = workspace();
    let output = cloudlab_cmd(dir.path())
        .args(["plan", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcomes: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = outcomes.as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["stack"], "CdkLabNetworkStack");
    assert_eq!(outcomes[0]["status"], "deployed");
    assert_eq!(outcomes[0]["resources"][0]["action"], "create");
}

#[test]
fn test_plan_human() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("PLAN"))
        .stdout(predicate::str::contains("to create"));
}

// ============================================================================
// List, Validate and Init Tests
// ============================================================================

#[test]
fn test_list() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("CdkLabNetworkStack"))
        .stdout(predicate::str::contains("CdkLabWebServerStack"));
}

#[test]
fn test_list_json() {
    let dir = workspace();
    let output = cloudlab_cmd(dir.path())
        .args(["list", "--long", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stacks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stacks[1]["dependencies"][0], "CdkLabNetworkStack");
    assert_eq!(stacks[1]["resource_types"]["AWS::EC2::Instance"], 2);
}

#[test]
fn test_validate_default() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All invariants hold"));
}

#[test]
fn test_invalid_database_settings_exit_code() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("cloudlab.toml"),
        "[database]\nallocated_storage_gb = 5\n",
    )
    .unwrap();
    cloudlab_cmd(dir.path())
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("allocated storage 5 GiB"));
}

#[test]
fn test_malformed_config_exit_code() {
    let dir = workspace();
    std::fs::write(dir.path().join("cloudlab.toml"), "[network\nmax_azs = ").unwrap();
    cloudlab_cmd(dir.path())
        .arg("list")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn test_missing_config_file() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .args(["--config", "missing.toml", "list"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_init_then_refuse_overwrite() {
    let dir = workspace();
    cloudlab_cmd(dir.path()).arg("init").assert().success();
    let written = dir.path().join("cloudlab.toml");
    assert!(written.exists());
    let content = std::fs::read_to_string(&written).unwrap();
    assert!(content.contains("[network]"));
    assert!(content.contains("MyAppDB"));

    cloudlab_cmd(dir.path())
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    cloudlab_cmd(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_init_config_is_loadable() {
    let dir = workspace();
    cloudlab_cmd(dir.path())
        .args(["init", "project"])
        .assert()
        .success();
    cloudlab_cmd(dir.path())
        .args(["--config", "project/cloudlab.toml", "validate"])
        .assert()
        .success();
}
