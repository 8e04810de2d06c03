use predicates::prelude::*;

use super::common::{BUNDLE, TestEnv};

#[test]
fn build_writes_tree_and_archive() {
  let env = TestEnv::new();

  env
    .build_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Built bundle"))
    .stdout(predicate::str::contains("openai-api-base"))
    .stdout(predicate::str::contains("run.bat"));

  let bundle = env.output_path().join(BUNDLE);
  assert!(bundle.join("runtime").join("python.exe").is_file());
  assert!(bundle.join("app").join("main.py").is_file());
  assert!(bundle.join("config.template").is_file());
  assert!(env.archive_path().is_file());
  assert!(env.content_manifest_path().is_file());
}

#[test]
fn build_is_the_default_command() {
  let env = TestEnv::new();

  env
    .airpack_cmd()
    .arg("--mirror")
    .arg(env.mirror_path())
    .assert()
    .success();

  assert!(env.archive_path().is_file());
}

#[test]
fn build_json_output_is_valid() {
  let env = TestEnv::new();

  let output = env.build_cmd().args(["-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["bundle"], BUNDLE);
  assert_eq!(summary["interpreter"], "3.11.4");
  assert_eq!(summary["packages"]["pkgB"], "2.0.0");
  assert_eq!(summary["states"].as_array().unwrap().last().unwrap()["state"], "done");
}

#[test]
fn missing_prerequisite_exits_with_one() {
  let env = TestEnv::new();

  env
    .build_cmd()
    .args(["--require", "airpack-no-such-tool@1.0"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("prerequisite check failed"));

  assert!(!env.output_path().exists());
}

#[test]
fn unresolvable_constraints_exit_with_two() {
  let env = TestEnv::new();
  env.write_manifest("\n[[package]]\nname = \"pkgB\"\nversion = \"<2.0\"\n");

  env
    .build_cmd()
    .assert()
    .code(2)
    .stderr(predicate::str::contains("resolving failed"))
    .stderr(predicate::str::contains("pkgB"));

  assert!(!env.output_path().exists());
}

#[test]
fn missing_manifest_exits_with_two() {
  let env = TestEnv::new();

  env
    .airpack_cmd()
    .args(["build", "--manifest", "nope.toml"])
    .assert()
    .code(2);
}

#[test]
fn rebuild_requires_clean() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();
  let first = std::fs::read(env.archive_path()).unwrap();

  env
    .build_cmd()
    .assert()
    .code(2)
    .stderr(predicate::str::contains("staging failed"));
  assert_eq!(std::fs::read(env.archive_path()).unwrap(), first);

  env.build_cmd().arg("--clean").assert().success();
  assert_eq!(std::fs::read(env.archive_path()).unwrap(), first);
}

#[test]
fn tar_gz_format() {
  let env = TestEnv::new();

  env.build_cmd().args(["--format", "tar.gz"]).assert().success();

  assert!(env.output_path().join(format!("{BUNDLE}.tar.gz")).is_file());
  assert!(!env.archive_path().exists());
}

#[test]
fn resolve_prints_graph_without_building() {
  let env = TestEnv::new();

  env
    .airpack_cmd()
    .arg("resolve")
    .arg("--manifest")
    .arg(env.manifest_path())
    .arg("--mirror")
    .arg(env.mirror_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("pkgA 1.5.0"))
    .stdout(predicate::str::contains("pkgB 2.0.0"));

  assert!(!env.output_path().exists());
}
