//! Checking an archive against its content manifest.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{CONTENT_MANIFEST_VERSION, ContentManifest, Listing, PackageError, read_archive};
use crate::util::hash::{ContentHash, hash_file};

/// One disagreement between a manifest and an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyProblem {
  ArchiveChanged {
    expected: ContentHash,
    actual: ContentHash,
  },
  Missing(String),
  Unexpected(String),
  MissingDirectory(String),
  UnexpectedDirectory(String),
  Changed {
    path: String,
    expected: ContentHash,
    actual: ContentHash,
  },
  OutOfOrder(String),
}

impl fmt::Display for VerifyProblem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VerifyProblem::ArchiveChanged { expected, actual } => {
        write!(f, "archive checksum is {}, expected {}", actual.short(), expected.short())
      }
      VerifyProblem::Missing(path) => write!(f, "{} is listed but not in the archive", path),
      VerifyProblem::Unexpected(path) => write!(f, "{} is in the archive but not listed", path),
      VerifyProblem::MissingDirectory(path) => write!(f, "directory {}/ is listed but not in the archive", path),
      VerifyProblem::UnexpectedDirectory(path) => write!(f, "directory {}/ is in the archive but not listed", path),
      VerifyProblem::Changed { path, expected, actual } => {
        write!(f, "{} has checksum {}, expected {}", path, actual.short(), expected.short())
      }
      VerifyProblem::OutOfOrder(path) => write!(f, "{} is out of order", path),
    }
  }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
  pub archive: PathBuf,
  pub manifest: ContentManifest,
  pub files_checked: usize,
  pub directories_checked: usize,
  pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
  pub fn is_ok(&self) -> bool {
    self.problems.is_empty()
  }
}

/// Re-hash the archive named by a content manifest and every entry in it.
pub fn verify(manifest_path: &Path) -> Result<VerifyReport, PackageError> {
  let text = fs::read_to_string(manifest_path).map_err(PackageError::read(manifest_path))?;
  let manifest: ContentManifest = serde_json::from_str(&text).map_err(|source| PackageError::Manifest {
    path: manifest_path.to_path_buf(),
    source,
  })?;
  if manifest.version != CONTENT_MANIFEST_VERSION {
    return Err(PackageError::UnsupportedManifest(manifest.version));
  }

  let dir = manifest_path.parent().unwrap_or(Path::new("."));
  let archive = dir.join(&manifest.archive.path);
  let mut problems = Vec::new();

  let actual = hash_file(&archive).map_err(PackageError::read(&archive))?;
  if actual != manifest.archive.checksum {
    problems.push(VerifyProblem::ArchiveChanged {
      expected: manifest.archive.checksum.clone(),
      actual,
    });
  }

  let entries = read_archive(manifest.format, &archive)?;
  problems.extend(compare(&manifest.listing(), &entries));

  for problem in &problems {
    warn!(archive = %archive.display(), %problem, "verification problem");
  }
  debug!(archive = %archive.display(), files = entries.files.len(), "verified archive");

  Ok(VerifyReport {
    archive,
    files_checked: entries.files.len(),
    directories_checked: entries.directories.len(),
    manifest,
    problems,
  })
}

/// Compare a listing against archive entries, path by path.
pub(super) fn compare(expected: &Listing, actual: &Listing) -> Vec<VerifyProblem> {
  let mut problems = Vec::new();
  let (expected_files, actual_files) = (&expected.files, &actual.files);

  for window in actual_files.windows(2) {
    if window[0].path >= window[1].path {
      problems.push(VerifyProblem::OutOfOrder(window[1].path.clone()));
    }
  }

  for record in expected_files {
    match actual_files.iter().find(|a| a.path == record.path) {
      None => problems.push(VerifyProblem::Missing(record.path.clone())),
      Some(found) if found.checksum != record.checksum || found.size_bytes != record.size_bytes => {
        problems.push(VerifyProblem::Changed {
          path: record.path.clone(),
          expected: record.checksum.clone(),
          actual: found.checksum.clone(),
        })
      }
      Some(_) => {}
    }
  }

  for record in actual_files {
    if !expected_files.iter().any(|e| e.path == record.path) {
      problems.push(VerifyProblem::Unexpected(record.path.clone()));
    }
  }

  let expected_dirs: BTreeSet<&str> = expected.directories.iter().map(String::as_str).collect();
  let actual_dirs: BTreeSet<&str> = actual.directories.iter().map(String::as_str).collect();
  problems.extend(
    expected_dirs
      .difference(&actual_dirs)
      .map(|d| VerifyProblem::MissingDirectory(d.to_string())),
  );
  problems.extend(
    actual_dirs
      .difference(&expected_dirs)
      .map(|d| VerifyProblem::UnexpectedDirectory(d.to_string())),
  );

  problems
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::{ArchiveFormat, FileRecord, package};
  use crate::stage::{OutputDir, StagedTree};
  use crate::util::hash::hash_bytes;
  use tempfile::TempDir;

  fn record(path: &str, content: &[u8]) -> FileRecord {
    FileRecord {
      path: path.to_string(),
      size_bytes: content.len() as u64,
      checksum: hash_bytes(content),
    }
  }

  fn build(temp: &TempDir, format: ArchiveFormat) -> PathBuf {
    let mut output = OutputDir::prepare(&temp.path().join("dist"), false).unwrap();
    let root = output.partial("demo");
    fs::create_dir_all(root.join("app")).unwrap();
    fs::create_dir_all(root.join("logs")).unwrap();
    fs::write(root.join("app/main.py"), "main").unwrap();
    fs::write(root.join("README.md"), "readme").unwrap();
    let tree = StagedTree {
      final_root: output.path().join("demo"),
      root,
    };
    let packaged = package(&tree, "demo", format, &mut output).unwrap();
    output.disarm();
    packaged.manifest_path
  }

  #[test]
  fn fresh_build_verifies() {
    for format in [ArchiveFormat::Zip, ArchiveFormat::TarGz] {
      let temp = TempDir::new().unwrap();
      let report = verify(&build(&temp, format)).unwrap();
      assert!(report.is_ok(), "{:?}", report.problems);
      assert_eq!(report.files_checked, 2);
      assert_eq!(report.directories_checked, 2);
    }
  }

  #[test]
  fn tampered_manifest_entry_is_reported() {
    let temp = TempDir::new().unwrap();
    let manifest_path = build(&temp, ArchiveFormat::Zip);
    let mut manifest: ContentManifest = serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest.files[0].checksum = hash_bytes(b"other");
    manifest.files.push(record("ghost.txt", b""));
    fs::write(&manifest_path, manifest.to_json().unwrap()).unwrap();

    let report = verify(&manifest_path).unwrap();
    assert!(!report.is_ok());
    assert!(report.problems.contains(&VerifyProblem::Missing("ghost.txt".to_string())));
    assert!(
      report
        .problems
        .iter()
        .any(|p| matches!(p, VerifyProblem::Changed { path, .. } if path == "README.md"))
    );
  }

  #[test]
  fn changed_archive_checksum_is_reported() {
    let temp = TempDir::new().unwrap();
    let manifest_path = build(&temp, ArchiveFormat::TarGz);
    let mut manifest: ContentManifest = serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest.archive.checksum = hash_bytes(b"another archive");
    fs::write(&manifest_path, manifest.to_json().unwrap()).unwrap();

    let report = verify(&manifest_path).unwrap();
    assert_eq!(report.problems.len(), 1);
    assert!(matches!(report.problems[0], VerifyProblem::ArchiveChanged { .. }));
  }

  #[test]
  fn compare_reports_each_kind() {
    let expected = Listing {
      directories: vec!["d".to_string(), "empty".to_string()],
      files: vec![record("a", b"1"), record("b", b"2")],
    };
    let actual = Listing {
      directories: vec!["d".to_string(), "extra".to_string()],
      files: vec![record("b", b"x"), record("a", b"1"), record("c", b"3")],
    };

    let problems = compare(&expected, &actual);
    assert!(problems.contains(&VerifyProblem::OutOfOrder("a".to_string())));
    assert!(problems.iter().any(|p| matches!(p, VerifyProblem::Changed { path, .. } if path == "b")));
    assert!(problems.contains(&VerifyProblem::Unexpected("c".to_string())));
    assert!(problems.contains(&VerifyProblem::MissingDirectory("empty".to_string())));
    assert!(problems.contains(&VerifyProblem::UnexpectedDirectory("extra".to_string())));
  }

  #[test]
  fn dropped_directory_in_manifest_is_reported() {
    let temp = TempDir::new().unwrap();
    let manifest_path = build(&temp, ArchiveFormat::TarGz);
    let mut manifest: ContentManifest = serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest.directories.retain(|d| d != "logs");
    fs::write(&manifest_path, manifest.to_json().unwrap()).unwrap();

    let report = verify(&manifest_path).unwrap();
    assert_eq!(report.problems, [VerifyProblem::UnexpectedDirectory("logs".to_string())]);
  }

  #[test]
  fn unsupported_manifest_version() {
    let temp = TempDir::new().unwrap();
    let manifest_path = build(&temp, ArchiveFormat::Zip);
    let text = fs::read_to_string(&manifest_path).unwrap().replacen("\"version\": 2", "\"version\": 9", 1);
    fs::write(&manifest_path, text).unwrap();
    assert!(matches!(verify(&manifest_path), Err(PackageError::UnsupportedManifest(9))));
  }
}
