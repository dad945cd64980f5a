use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::TestDeployment;

/// Test the resolve command's tree output
#[test]
fn test_resolve_tree() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["resolve", "settitle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Delivery order:"))
        .stdout(predicate::str::contains("1. core"))
        .stdout(predicate::str::contains("3. settitle"));
}

/// Test the resolve command's JSON output
#[test]
fn test_resolve_json() {
    let deployment = TestDeployment::new();
    let output = deployment.gadgetc().args(["resolve", "dynamic-height", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let order: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(order, vec!["core", "rpc", "dynamic-height"]);
}

/// Test that resolving an unknown feature fails with a readable error
#[test]
fn test_resolve_unknown_feature() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["resolve", "opensocial"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Feature 'opensocial' is not supported by container 'default'"));
}

/// Test the env command
#[test]
fn test_env() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("gadgets.rpc.container();\ngadgets.config.init({"));
}

/// Test the js command
#[test]
fn test_js() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["js", "rpc"])
        .assert()
        .success()
        .stdout("var gadgets = gadgets || {};\ngadgets.rpc = {};\n");
}

/// Test the js command for the file rendered pages reference
#[test]
fn test_js_served_file() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["js", "settitle.js"])
        .assert()
        .success()
        .stdout("gadgets.window.setTitle = function() {};\n");
}

/// Test that a missing configuration file is reported
#[test]
fn test_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("gadgetc")
        .unwrap()
        .current_dir(dir.path())
        .args(["--config", "does-not-exist.toml", "env"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that a malformed preference argument is rejected before fetching
#[test]
fn test_render_bad_pref() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["render", "http://127.0.0.1:9/gadget.xml", "--pref", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--pref"));
}

/// Test that render failures become a JSON error payload with --json
#[test]
fn test_render_json_error() {
    let deployment = TestDeployment::new();
    deployment
        .gadgetc()
        .args(["render", "http://127.0.0.1:9/gadget.xml", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#"{"code":50"#));
}
