//! End-to-end tests for the `merge` command.
//!
//! These tests invoke the actual CLI binary and validate the behavior of
//! the `merge` subcommand from a user's perspective. No network access is
//! required: the subscription list is either empty or deliberately
//! broken, and the interesting layering comes from on-disk operator
//! files.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// A command with a clean environment pointed at a temp layout.
fn merge_cmd(temp: &assert_fs::TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("subforge");
    cmd.arg("merge")
        .env("MIHOMO_DIR", temp.child("mihomo").path())
        .env("SCRIPTS_DIR", temp.child("scripts").path())
        .env_remove("CLASH_EXTERNAL_CONTROLLER")
        .env_remove("CLASH_MIXED_PORT")
        .env_remove("CLASH_SOCKS_PORT")
        .env_remove("CLASH_SECRET")
        .env_remove("CLASH_DISABLE_GEOIP");
    cmd
}

#[test]
fn test_merge_with_no_subscriptions_succeeds() {
    let temp = assert_fs::TempDir::new().unwrap();

    merge_cmd(&temp)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 0 node(s)"));

    let config = temp.child("mihomo/config.yaml");
    config.assert(predicate::path::exists());
    config.assert(predicate::str::contains("mode: rule"));
    config.assert(predicate::str::contains("allow-lan: true"));
    config.assert(predicate::str::contains("MATCH,PROXY"));
}

#[test]
fn test_merge_quiet_prints_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();

    merge_cmd(&temp)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    temp.child("mihomo/config.yaml")
        .assert(predicate::path::exists());
}

#[test]
fn test_merge_reports_failing_subscription_and_still_writes() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("scripts/subscriptions.json")
        .write_str(r#"{"subscriptions": [{"name": "broken", "url": ""}]}"#)
        .unwrap();

    merge_cmd(&temp)
        .assert()
        .success()
        .stdout(predicate::str::contains("warning: broken"));

    temp.child("mihomo/config.yaml")
        .assert(predicate::path::exists());
}

#[test]
fn test_merge_applies_override_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("scripts/override.yaml")
        .write_str("log-level: warning\n")
        .unwrap();

    merge_cmd(&temp).assert().success();

    temp.child("mihomo/config.yaml")
        .assert(predicate::str::contains("log-level: warning"));
}

#[test]
fn test_merge_honors_runtime_env() {
    let temp = assert_fs::TempDir::new().unwrap();

    merge_cmd(&temp)
        .env("CLASH_SECRET", "topsecret")
        .env("CLASH_MIXED_PORT", "7899")
        .env("CLASH_EXTERNAL_CONTROLLER", "127.0.0.1:19090")
        .assert()
        .success();

    let config = temp.child("mihomo/config.yaml");
    config.assert(predicate::str::contains("secret: topsecret"));
    config.assert(predicate::str::contains("mixed-port: 7899"));
    config.assert(predicate::str::contains("external-controller: 127.0.0.1:19090"));
}

#[test]
fn test_merge_strips_geoip_when_disabled() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("scripts/template.yaml")
        .write_str("rules:\n  - GEOIP,CN,DIRECT\n  - MATCH,PROXY\n")
        .unwrap();

    merge_cmd(&temp)
        .env("CLASH_DISABLE_GEOIP", "1")
        .assert()
        .success();

    let config = temp.child("mihomo/config.yaml");
    config.assert(predicate::str::contains("MATCH,PROXY"));
    config.assert(predicate::str::contains("GEOIP,CN,DIRECT").not());
}

#[test]
fn test_second_merge_backs_up_previous_config() {
    let temp = assert_fs::TempDir::new().unwrap();

    merge_cmd(&temp).arg("--quiet").assert().success();
    merge_cmd(&temp)
        .assert()
        .success()
        .stdout(predicate::str::contains("backed up to"));

    let backups: Vec<_> = std::fs::read_dir(temp.child("mihomo/backups").path())
        .unwrap()
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_merge_help() {
    cargo_bin_cmd!("subforge")
        .args(["merge", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-dir"))
        .stdout(predicate::str::contains("--scripts-dir"));
}

#[test]
fn test_unknown_subcommand_fails() {
    cargo_bin_cmd!("subforge")
        .arg("definitely-not-a-command")
        .assert()
        .failure();
}
