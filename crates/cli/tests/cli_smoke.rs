//! CLI smoke tests for airpack.
//!
//! These tests verify that every command parses, runs without panicking and
//! returns the expected exit code.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the airpack binary.
fn airpack_cmd() -> Command {
  cargo_bin_cmd!("airpack")
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  airpack_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  airpack_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("airpack"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "resolve", "verify", "cache", "init"] {
    airpack_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn invalid_require_is_a_usage_error() {
  airpack_cmd()
    .args(["build", "--require", "python"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("COMMAND@MIN_VERSION"));
}

// =============================================================================
// init
// =============================================================================

#[test]
#[serial]
fn init_creates_project_files() {
  let temp = TempDir::new().unwrap();
  let dir = temp.path().join("my_tool");

  airpack_cmd()
    .arg("init")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("my_tool"));

  assert!(dir.join("airpack.toml").exists());
  assert!(dir.join("app").join("main.py").exists());
}

#[test]
#[serial]
fn init_fails_if_manifest_exists() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("airpack.toml"), "# existing").unwrap();

  airpack_cmd()
    .arg("init")
    .arg(temp.path())
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));
}

// =============================================================================
// build / verify
// =============================================================================

#[test]
fn build_without_manifest_fails_cleanly() {
  let temp = TempDir::new().unwrap();

  airpack_cmd()
    .current_dir(temp.path())
    .env("AIRPACK_CACHE_DIR", temp.path().join("cache"))
    .assert()
    .code(2)
    .stderr(predicate::str::contains("resolving failed"));
}

#[test]
fn verify_missing_manifest_fails() {
  airpack_cmd()
    .args(["verify", "/nonexistent/bundle.manifest.json"])
    .assert()
    .code(2);
}

#[test]
fn cache_info_on_empty_cache() {
  let temp = TempDir::new().unwrap();

  airpack_cmd()
    .args(["cache", "info"])
    .env("AIRPACK_CACHE_DIR", temp.path().join("cache"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Artifacts"));
}
