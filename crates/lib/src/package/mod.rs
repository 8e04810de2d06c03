//! Archive packaging.
//!
//! Packs a staged tree into one archive plus a sidecar content manifest
//! (`<bundle>.manifest.json`) recording every directory and the path, size
//! and SHA-256 of every file. Entries are enumerated in lexicographic order
//! of their `/`-separated relative path, so identical trees give
//! byte-identical archives.
//!
//! Outputs are written under `.partial` names, checked against each other,
//! and only then renamed into place, archive last. If a rename fails, the
//! outputs already moved are removed again, so a failed build never leaves
//! a bundle at its final path without its archive.

mod archive;
mod verify;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::stage::{OutputDir, StagedTree};
use crate::util::fs::to_portable;
use crate::util::hash::{ContentHash, hash_file};

pub use archive::{Entry, Listing, read_archive, write_archive};
pub use verify::{VerifyProblem, VerifyReport, verify};

/// Content manifest format written by this version.
pub const CONTENT_MANIFEST_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("path {} cannot be stored portably", path.display())]
  InvalidPath { path: PathBuf },

  #[error("invalid content manifest {}: {source}", path.display())]
  Manifest {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported content manifest version {0}")]
  UnsupportedManifest(u32),

  #[error("archive does not match the staged tree: {0}")]
  Inconsistent(VerifyProblem),

  #[error("failed to move {} into place: {source}", path.display())]
  Rename {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl PackageError {
  fn read(path: &Path) -> impl FnOnce(io::Error) -> PackageError + '_ {
    move |source| PackageError::Read {
      path: path.to_path_buf(),
      source,
    }
  }

  fn write(path: &Path) -> impl FnOnce(io::Error) -> PackageError + '_ {
    move |source| PackageError::Write {
      path: path.to_path_buf(),
      source,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
  #[default]
  #[serde(rename = "zip")]
  Zip,
  #[serde(rename = "tar.gz", alias = "tgz")]
  TarGz,
}

impl ArchiveFormat {
  pub fn extension(&self) -> &'static str {
    match self {
      ArchiveFormat::Zip => "zip",
      ArchiveFormat::TarGz => "tar.gz",
    }
  }
}

impl fmt::Display for ArchiveFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}

impl FromStr for ArchiveFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "zip" => Ok(ArchiveFormat::Zip),
      "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
      other => Err(format!("unknown archive format '{}' (expected zip or tar.gz)", other)),
    }
  }
}

/// Path, size and checksum of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
  pub path: String,
  pub size_bytes: u64,
  pub checksum: ContentHash,
}

/// The sidecar written next to every archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentManifest {
  pub version: u32,
  pub bundle: String,
  pub format: ArchiveFormat,
  /// `path` is relative to the manifest's directory.
  pub archive: FileRecord,
  /// Every directory below the bundle root, empty ones included.
  pub directories: Vec<String>,
  pub files: Vec<FileRecord>,
}

impl ContentManifest {
  pub fn listing(&self) -> Listing {
    Listing {
      directories: self.directories.clone(),
      files: self.files.clone(),
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(self)?;
    json.push('\n');
    Ok(json)
  }

  pub fn total_bytes(&self) -> u64 {
    self.files.iter().map(|f| f.size_bytes).sum()
  }
}

/// The durable outputs of a successful build.
#[derive(Debug, Clone)]
pub struct PackagedBundle {
  pub bundle_dir: PathBuf,
  pub archive: PathBuf,
  pub manifest_path: PathBuf,
  pub content: ContentManifest,
}

/// The contents of a staged tree as portable relative paths, sorted.
#[derive(Debug, Default)]
pub struct TreeContents {
  pub directories: Vec<String>,
  /// (relative path, absolute path)
  pub files: Vec<(String, PathBuf)>,
}

impl TreeContents {
  /// Archive entries in archive order.
  pub fn entries(&self) -> Vec<Entry<'_>> {
    let mut entries: Vec<Entry<'_>> = self
      .directories
      .iter()
      .map(|name| Entry::Directory(name.as_str()))
      .chain(self.files.iter().map(|(name, path)| Entry::File {
        name: name.as_str(),
        source: path.as_path(),
      }))
      .collect();
    entries.sort_by_key(Entry::sort_key);
    entries
  }
}

/// Collect every directory and file below `root`.
pub fn collect_tree(root: &Path) -> Result<TreeContents, PackageError> {
  let mut contents = TreeContents::default();
  for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
    let entry = entry.map_err(|e| PackageError::Read {
      path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
      source: e.into(),
    })?;
    let file_type = entry.file_type();
    if !file_type.is_file() && !file_type.is_dir() {
      continue;
    }
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    let portable = to_portable(relative).ok_or_else(|| PackageError::InvalidPath {
      path: entry.path().to_path_buf(),
    })?;
    if file_type.is_dir() {
      contents.directories.push(portable);
    } else {
      contents.files.push((portable, entry.path().to_path_buf()));
    }
  }
  contents.directories.sort();
  contents.files.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(contents)
}

/// Archive a staged tree and move all outputs into their final places.
pub fn package(
  tree: &StagedTree,
  bundle: &str,
  format: ArchiveFormat,
  output: &mut OutputDir,
) -> Result<PackagedBundle, PackageError> {
  let contents = collect_tree(&tree.root)?;

  let archive_name = format!("{}.{}", bundle, format.extension());
  let manifest_name = format!("{}.manifest.json", bundle);
  let archive_partial = output.partial(&archive_name);
  let manifest_partial = output.partial(&manifest_name);

  let written = write_archive(format, &archive_partial, &contents.entries())?;
  let archive_size = fs::metadata(&archive_partial)
    .map_err(PackageError::read(&archive_partial))?
    .len();
  let archive_checksum = hash_file(&archive_partial).map_err(PackageError::read(&archive_partial))?;
  debug!(
    files = written.files.len(),
    directories = written.directories.len(),
    bytes = archive_size,
    "archive written"
  );

  let content = ContentManifest {
    version: CONTENT_MANIFEST_VERSION,
    bundle: bundle.to_string(),
    format,
    archive: FileRecord {
      path: archive_name.clone(),
      size_bytes: archive_size,
      checksum: archive_checksum,
    },
    directories: written.directories,
    files: written.files,
  };

  // The archive must hold exactly what is on disk in the staged tree.
  let on_disk = Listing {
    directories: contents.directories.clone(),
    files: contents
      .files
      .iter()
      .map(|(name, path)| {
        let checksum = hash_file(path).map_err(PackageError::read(path))?;
        let size_bytes = fs::metadata(path).map_err(PackageError::read(path))?.len();
        Ok(FileRecord {
          path: name.clone(),
          size_bytes,
          checksum,
        })
      })
      .collect::<Result<Vec<_>, PackageError>>()?,
  };
  if let Some(problem) = verify::compare(&on_disk, &read_archive(format, &archive_partial)?).into_iter().next() {
    return Err(PackageError::Inconsistent(problem));
  }

  let json = content.to_json().map_err(|source| PackageError::Manifest {
    path: manifest_partial.clone(),
    source,
  })?;
  fs::write(&manifest_partial, json).map_err(PackageError::write(&manifest_partial))?;

  let out = output.path();
  let bundle_dir = tree.final_root.clone();
  let manifest_path = out.join(&manifest_name);
  let archive = out.join(&archive_name);
  place(&[
    (tree.root.as_path(), bundle_dir.as_path()),
    (manifest_partial.as_path(), manifest_path.as_path()),
    (archive_partial.as_path(), archive.as_path()),
  ])?;

  info!(
    archive = %archive.display(),
    files = content.files.len(),
    bytes = content.archive.size_bytes,
    checksum = %content.archive.checksum.short(),
    "packaged bundle"
  );

  Ok(PackagedBundle {
    bundle_dir,
    archive,
    manifest_path,
    content,
  })
}

/// Rename each pair in order. On failure, remove what was already moved.
fn place(moves: &[(&Path, &Path)]) -> Result<(), PackageError> {
  for (done, (from, to)) in moves.iter().enumerate() {
    if let Err(err) = rename(from, to) {
      for (_, placed) in moves[..done].iter().rev() {
        let removed = if placed.is_dir() {
          fs::remove_dir_all(placed)
        } else {
          fs::remove_file(placed)
        };
        if let Err(e) = removed {
          warn!(path = %placed.display(), error = %e, "failed to remove output after a failed rename");
        }
      }
      return Err(err);
    }
  }
  Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<(), PackageError> {
  fs::rename(from, to).map_err(|source| PackageError::Rename {
    path: to.to_path_buf(),
    source,
  })
}
