//! Artifact extraction.
//!
//! Supports:
//! - `.zip` / `.whl`
//! - `.tar.gz` / `.tgz`
//! - `.tar`
//!
//! Anything else is copied as a single file. Archives are extracted as-is,
//! without stripping a leading directory, and entries that would land
//! outside the destination are rejected.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UnpackError {
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("invalid zip archive: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("archive entry '{0}' escapes the destination")]
  UnsafeEntry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
  Zip,
  TarGz,
  Tar,
  File,
}

impl ArtifactKind {
  pub fn detect(path: &Path) -> Self {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default()
      .to_ascii_lowercase();
    if name.ends_with(".zip") || name.ends_with(".whl") {
      ArtifactKind::Zip
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      ArtifactKind::TarGz
    } else if name.ends_with(".tar") {
      ArtifactKind::Tar
    } else {
      ArtifactKind::File
    }
  }
}

/// Extract (or copy) `artifact` into `dest`, creating `dest` if needed.
pub fn unpack_artifact(artifact: &Path, dest: &Path) -> Result<ArtifactKind, UnpackError> {
  fs::create_dir_all(dest)?;
  let kind = ArtifactKind::detect(artifact);

  match kind {
    ArtifactKind::Zip => unpack_zip(artifact, dest)?,
    ArtifactKind::TarGz => {
      let file = File::open(artifact)?;
      unpack_tar(Archive::new(GzDecoder::new(BufReader::new(file))), dest)?;
    }
    ArtifactKind::Tar => {
      let file = File::open(artifact)?;
      unpack_tar(Archive::new(BufReader::new(file)), dest)?;
    }
    ArtifactKind::File => {
      let name = artifact
        .file_name()
        .ok_or_else(|| UnpackError::UnsafeEntry(artifact.display().to_string()))?;
      fs::copy(artifact, dest.join(name))?;
    }
  }

  debug!(artifact = %artifact.display(), dest = %dest.display(), ?kind, "unpacked");
  Ok(kind)
}

fn unpack_tar<R: io::Read>(mut archive: Archive<R>, dest: &Path) -> Result<(), UnpackError> {
  archive.set_preserve_mtime(false);
  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.display().to_string();
    // unpack_in refuses `..` and absolute paths, returning false.
    if !entry.unpack_in(dest)? {
      return Err(UnpackError::UnsafeEntry(path));
    }
  }
  Ok(())
}

fn unpack_zip(artifact: &Path, dest: &Path) -> Result<(), UnpackError> {
  let file = File::open(artifact)?;
  let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

  for i in 0..archive.len() {
    let mut entry = archive.by_index(i)?;
    let relative: PathBuf = entry
      .enclosed_name()
      .ok_or_else(|| UnpackError::UnsafeEntry(entry.name().to_string()))?;
    let dest_path = dest.join(&relative);

    if entry.is_dir() {
      fs::create_dir_all(&dest_path)?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut outfile = File::create(&dest_path)?;
    io::copy(&mut entry, &mut outfile)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = entry.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode & 0o777))?;
      }
    }
  }

  Ok(())
}
