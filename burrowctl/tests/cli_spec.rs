use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_prints_usage_and_exits_zero() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn short_help_also_exits_zero() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .arg("-h")
        .assert()
        .success();
}

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn short_version_flag_works() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unresolvable_engine_fails_preflight_with_remediation() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .env("BURROW_CONTAINER_RUNTIME", "/nonexistent/container-engine")
        .assert()
        .failure()
        .stderr(predicate::str::contains("container engine"));
}

#[test]
fn unknown_flag_is_an_error() {
    Command::cargo_bin("burrowctl")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .failure();
}
