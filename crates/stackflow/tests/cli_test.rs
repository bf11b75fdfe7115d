#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DEMO: &str = r#"
project "cdk-demo"

variables {
    environment "dev"
}

target "primary" account="445362076974" region="us-east-1"

network "net" {
    name "cdk-demo-vpc"
    cidr "10.0.0.0/16"
    zones "us-east-1a" "us-east-1b" "us-east-1c"
}
security "sec" network="net"
load-balancer "elb" network="net" security="sec"
backend "app" network="net" security="sec" load-balancer="elb" {
    resource-prefix "cdk-demo"
    environment "{{ environment }}"
    db-name "test"
    db-engine-version "15.3"
}
"#;

/// プロジェクトディレクトリと空のユーザー設定ディレクトリ
struct Sandbox {
    project: TempDir,
    config_home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            project: tempfile::tempdir().unwrap(),
            config_home: tempfile::tempdir().unwrap(),
        }
    }

    fn with_demo() -> Self {
        let sandbox = Self::new();
        fs::write(sandbox.dir().join("stackflow.kdl"), DEMO).unwrap();
        sandbox
    }

    fn dir(&self) -> &Path {
        self.project.path()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackflow").unwrap();
        cmd.current_dir(self.dir())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env_remove("STACKFLOW_CONFIG_PATH")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("diff"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stackflow"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.arg("deploy-everything").assert().failure();
}

#[test]
fn test_synth_help() {
    let mut cmd = Command::cargo_bin("stackflow").unwrap();
    cmd.args(["synth", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--out"))
        .stdout(predicate::str::contains("--unit"));
}

#[test]
fn test_init_then_validate() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(sandbox.dir().join("stackflow.kdl").exists());

    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployment is valid"));
}

#[test]
fn test_init_refuses_overwrite() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    sandbox.cmd().args(["init", "--force"]).assert().success();
    let content = fs::read_to_string(sandbox.dir().join("stackflow.kdl")).unwrap();
    assert!(content.contains("my-app"));
}

#[test]
fn test_validate_demo() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Units: 4"))
        .stdout(predicate::str::contains("primary"));
}

#[test]
fn test_validate_without_project() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_validate_reports_compose_errors() {
    let sandbox = Sandbox::new();
    fs::write(
        sandbox.dir().join("stackflow.kdl"),
        r#"
target "primary" region="us-east-1"
security "sec" network="net"
"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("net"));
}

#[test]
fn test_synth_writes_assembly() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .arg("synth")
        .assert()
        .success()
        .stderr(predicate::str::contains("Synthesized"));

    let out = sandbox.dir().join("cdk.out");
    assert!(out.join("manifest.json").exists());
    assert!(out.join("net.template.json").exists());
    assert!(out.join("app.template.json").exists());
}

#[test]
fn test_synth_prints_selected_unit() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .args(["synth", "--unit", "net", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AWS::EC2::VPC"))
        .stdout(predicate::str::contains("AWS::SQS::Queue").not());
}

#[test]
fn test_synth_unknown_unit() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .args(["synth", "--unit", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
    assert!(!sandbox.dir().join("cdk.out").exists());
}

#[test]
fn test_var_overrides_file_variable() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .args(["--var", "environment=prod", "synth", "--unit", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SendEmailFromSQS-prod"));
}

#[test]
fn test_list_in_deployment_order() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("cdk-demo"))
        .stdout(predicate::str::is_match(r"(?s)net.*sec.*elb.*app").unwrap())
        .stdout(predicate::str::contains("depends on"));
}

#[test]
fn test_diff_after_synth() {
    let sandbox = Sandbox::with_demo();
    sandbox
        .cmd()
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("No previous synth"))
        .stdout(predicate::str::contains("Vpc"));

    sandbox.cmd().arg("synth").assert().success();
    sandbox
        .cmd()
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes."));

    sandbox
        .cmd()
        .args(["--var", "environment=prod", "diff"])
        .assert()
        .success()
        .stdout(predicate::str::contains("~"));
}
