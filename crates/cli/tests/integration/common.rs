//! Shared test helpers for CLI integration tests.

use std::io::Write;
use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const BUNDLE: &str = "assistant_offline";

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
  let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
  for (name, contents) in files {
    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
    writer.write_all(contents.as_bytes()).unwrap();
  }
  writer.finish().unwrap().into_inner()
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the project, a
/// directory mirror, the cache and the output.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A project depending on `pkgA`, which pulls in `pkgB`.
  pub fn new() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_manifest("");
    env.write_file("app/main.py", "print('hello')\n");
    env.write_mirror();
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Write `airpack.toml`, with `extra` appended before the `[app]` table.
  pub fn write_manifest(&self, extra: &str) {
    self.write_file(
      "airpack.toml",
      &format!(
        r#"
[bundle]
name = "{BUNDLE}"

[interpreter]
version = "3.11"

[[package]]
name = "pkgA"
{extra}
[app]
entry = "main.py"
"#
      ),
    );
  }

  fn add_artifact(&self, filename: &str, files: &[(&str, &str)]) -> serde_json::Value {
    let bytes = zip_bytes(files);
    let path = self.mirror_path().join("files").join(filename);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, &bytes).unwrap();
    serde_json::json!({
      "url": format!("files/{filename}"),
      "checksum": hex::encode(Sha256::digest(&bytes)),
    })
  }

  fn write_mirror(&self) {
    let interpreter = self.add_artifact("python-embed.zip", &[("python.exe", "stub")]);
    let pkg_a = self.add_artifact("pkgA-1.5.0.zip", &[("pkgA/__init__.py", "")]);
    let pkg_b = self.add_artifact("pkgB-2.0.0.zip", &[("pkgB/__init__.py", "")]);

    let index = serde_json::json!({
      "version": 1,
      "interpreters": [
        { "version": "3.11.4", "url": interpreter["url"], "checksum": interpreter["checksum"] }
      ],
      "packages": {
        "pkgA": [{
          "version": "1.5.0",
          "url": pkg_a["url"],
          "checksum": pkg_a["checksum"],
          "dependencies": { "pkgB": ">=2.0" }
        }],
        "pkgB": [
          { "version": "2.0.0", "url": pkg_b["url"], "checksum": pkg_b["checksum"] },
          { "version": "1.0.0", "url": pkg_b["url"], "checksum": pkg_b["checksum"] }
        ]
      }
    });
    std::fs::write(
      self.mirror_path().join("index.json"),
      serde_json::to_vec_pretty(&index).unwrap(),
    )
    .unwrap();
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.temp.path().join("airpack.toml")
  }

  pub fn mirror_path(&self) -> PathBuf {
    self.temp.path().join("mirror")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.temp.path().join("cache")
  }

  pub fn output_path(&self) -> PathBuf {
    self.temp.path().join("dist")
  }

  pub fn archive_path(&self) -> PathBuf {
    self.output_path().join(format!("{BUNDLE}.zip"))
  }

  pub fn content_manifest_path(&self) -> PathBuf {
    self.output_path().join(format!("{BUNDLE}.manifest.json"))
  }

  /// Get a pre-configured Command for the airpack binary.
  ///
  /// Points the cache at the test directory and clears any mirror set in
  /// the calling environment.
  pub fn airpack_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("airpack");
    cmd.env("AIRPACK_CACHE_DIR", self.cache_path());
    cmd.env_remove("AIRPACK_MIRROR");
    cmd.env_remove("SOURCE_DATE_EPOCH");
    cmd.current_dir(self.temp.path());
    cmd
  }

  /// `airpack build` with the manifest and mirror of this environment.
  pub fn build_cmd(&self) -> Command {
    let mut cmd = self.airpack_cmd();
    cmd
      .arg("build")
      .arg("--manifest")
      .arg(self.manifest_path())
      .arg("--mirror")
      .arg(self.mirror_path())
      .args(["--retries", "0"]);
    cmd
  }
}
