use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn verify_accepts_fresh_build() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();

  env
    .airpack_cmd()
    .arg("verify")
    .arg(env.content_manifest_path())
    .assert()
    .success()
    .stdout(predicate::str::contains("matches its manifest"));
}

#[test]
fn verify_rejects_archive_with_different_checksum() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();
  let path = env.content_manifest_path();
  let mut manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
  manifest["archive"]["checksum"] = serde_json::Value::from("0".repeat(64));
  std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();

  env
    .airpack_cmd()
    .arg("verify")
    .arg(env.content_manifest_path())
    .assert()
    .code(2)
    .stderr(predicate::str::contains("does not match"));
}

#[test]
fn verify_json_lists_problems() {
  let env = TestEnv::new();
  env.build_cmd().assert().success();
  let path = env.content_manifest_path();
  let mut manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
  manifest["files"].as_array_mut().unwrap().push(serde_json::json!({
    "path": "zzz/extra.txt",
    "size_bytes": 1,
    "checksum": "0".repeat(64),
  }));
  std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();

  let output = env.airpack_cmd().arg("verify").arg(&path).args(["-o", "json"]).output().unwrap();
  assert_eq!(output.status.code(), Some(2));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["ok"], false);
  assert!(report["problems"][0].as_str().unwrap().contains("zzz/extra.txt"));
}
