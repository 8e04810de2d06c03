//! Shared fixtures: a project directory and a local directory mirror.

use std::io::Write;
use std::path::{Path, PathBuf};

use airpack_lib::config::BuildOverrides;
use airpack_lib::pipeline::BuildRequest;
use airpack_lib::util::hash::hash_bytes;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Build a zip archive in memory from `(path, contents)` pairs.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
  let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
  for (name, contents) in files {
    writer.start_file(*name, SimpleFileOptions::default()).unwrap();
    writer.write_all(contents.as_bytes()).unwrap();
  }
  writer.finish().unwrap().into_inner()
}

pub struct MirrorArtifact {
  pub url: String,
  pub checksum: String,
}

/// A temporary workspace holding a project, a mirror and a cache.
pub struct Project {
  pub temp: TempDir,
}

impl Project {
  /// A project whose app depends on `pkgA`, which pulls in `pkgB`.
  pub fn with_dependency_chain() -> Self {
    let project = Self {
      temp: TempDir::new().unwrap(),
    };
    project.write_manifest("");
    project.write_app();

    let interpreter = project.add_artifact("python-3.11.4-embed-amd64.zip", &[("python.exe", "stub")]);
    let pkg_a = project.add_artifact("pkgA-1.5.0.zip", &[("pkgA/__init__.py", "A = 1\n")]);
    let pkg_b = project.add_artifact("pkgB-2.0.0.zip", &[("pkgB/__init__.py", "B = 2\n")]);
    project.write_index(&interpreter, &pkg_a, &pkg_b.url, &pkg_b.checksum);
    project
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.path().join("airpack.toml")
  }

  pub fn mirror_dir(&self) -> PathBuf {
    self.path().join("mirror")
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.path().join("cache")
  }

  pub fn output_dir(&self) -> PathBuf {
    self.path().join("dist")
  }

  /// Write the manifest, with `extra_packages` appended as raw TOML.
  pub fn write_manifest(&self, extra_packages: &str) {
    let content = format!(
      r#"
[bundle]
name = "assistant_offline"

[interpreter]
version = "3.11"

[[package]]
name = "pkgA"
version = ">=1.0"
{extra_packages}
[app]
entry = "main.py"
"#
    );
    std::fs::write(self.manifest_path(), content).unwrap();
  }

  fn write_app(&self) {
    let app = self.path().join("app");
    std::fs::create_dir_all(app.join("__pycache__")).unwrap();
    std::fs::write(app.join("main.py"), "print('hello')\n").unwrap();
    std::fs::write(app.join("__pycache__").join("main.cpython-311.pyc"), "junk").unwrap();
  }

  pub fn add_artifact(&self, filename: &str, files: &[(&str, &str)]) -> MirrorArtifact {
    let bytes = zip_bytes(files);
    let dir = self.mirror_dir().join("files");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(filename), &bytes).unwrap();
    MirrorArtifact {
      url: format!("files/{filename}"),
      checksum: hash_bytes(&bytes).0,
    }
  }

  /// Write `index.json`, letting the caller pick pkgB's listed checksum.
  pub fn write_index(&self, interpreter: &MirrorArtifact, pkg_a: &MirrorArtifact, pkg_b_url: &str, pkg_b_checksum: &str) {
    let index = serde_json::json!({
      "version": 1,
      "interpreters": [
        { "version": "3.11.4", "url": interpreter.url, "checksum": interpreter.checksum }
      ],
      "packages": {
        "pkgA": [
          {
            "version": "1.5.0",
            "url": pkg_a.url,
            "checksum": pkg_a.checksum,
            "dependencies": { "pkgB": ">=2.0" }
          }
        ],
        "pkgB": [
          { "version": "2.0.0", "url": pkg_b_url, "checksum": pkg_b_checksum },
          { "version": "1.9.0", "url": pkg_b_url, "checksum": pkg_b_checksum }
        ]
      }
    });
    std::fs::write(
      self.mirror_dir().join("index.json"),
      serde_json::to_vec_pretty(&index).unwrap(),
    )
    .unwrap();
  }

  /// Add one release of `name` to the existing `index.json`.
  pub fn add_index_release(&self, name: &str, version: &str, url: &str, checksum: &str) {
    let path = self.mirror_dir().join("index.json");
    let mut index: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    index["packages"][name] = serde_json::json!([{ "version": version, "url": url, "checksum": checksum }]);
    std::fs::write(&path, serde_json::to_vec_pretty(&index).unwrap()).unwrap();
  }

  pub fn request(&self) -> BuildRequest {
    BuildRequest {
      manifest_path: self.manifest_path(),
      overrides: BuildOverrides {
        mirror: Some(self.mirror_dir().to_string_lossy().into_owned()),
        cache_dir: Some(self.cache_dir()),
        output_dir: Some(self.output_dir()),
        workers: Some(2),
        retries: Some(0),
        ..Default::default()
      },
      prerequisite: None,
    }
  }
}
