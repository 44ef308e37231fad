//! CLI integration tests for dbferry.
//!
//! These verify argument parsing, help output, and exit codes for
//! configuration error paths. Nothing here touches a real database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the dbferry binary.
fn cmd() -> Command {
    Command::cargo_bin("dbferry").unwrap()
}

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbferry"));
}

#[test]
fn test_missing_subcommand_fails() {
    cmd().assert().failure();
}

#[test]
fn test_missing_config_file_exits_with_code_two() {
    cmd()
        .args(["--config", "/nonexistent/config.yaml", "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_invalid_yaml_config_exits_with_code_two() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source: [not, a, mapping").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_config_missing_required_field_exits_with_code_two() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
source:
  kind: mssql
  host: ""
  database: db
  user: u
  password: p
destination:
  kind: postgres
  host: h
  database: db
  user: u
  password: p
"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("source.host"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    cmd().args(["--bogus", "run"]).assert().failure();
}
