use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn cache_info_reports_artifacts_after_build() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();

  let output = env.airpack_cmd().args(["cache", "info", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(info["artifacts"], 3);
  assert_eq!(info["index_cached"], true);
}

#[test]
fn cache_clear_requires_force_when_not_interactive() {
  let env = TestEnv::new();

  env
    .airpack_cmd()
    .args(["cache", "clear"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));
}

#[test]
fn cache_clear_removes_artifacts() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();

  env
    .airpack_cmd()
    .args(["cache", "clear", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cache cleared"));

  let output = env.airpack_cmd().args(["cache", "info", "-o", "json"]).output().unwrap();
  let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(info["artifacts"], 0);
}
