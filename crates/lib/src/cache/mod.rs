//! Persistent artifact cache.
//!
//! Artifacts are stored by content identity:
//!
//! ```text
//! <cache>/
//! ├── .lock
//! ├── index.json                          last index snapshot fetched from a mirror
//! ├── interpreters/<version>/<checksum>/<filename>
//! └── artifacts/<name>/<version>/<checksum>/<filename>
//! ```
//!
//! Interpreter runtimes live in their own namespace, so no package name can
//! collide with them.
//!
//! Entries are written to a temporary file in their final directory and
//! renamed into place, so concurrent writers of the same key never expose a
//! partial file. Nothing is evicted implicitly; a cached file whose checksum
//! no longer matches its key is reported, not replaced.

pub mod lock;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::INDEX_FILENAME;
use crate::util::fs::write_atomic;
use crate::util::hash::{ContentHash, hash_file};

pub use lock::{CacheLock, CacheLockError, LockMode};

const ARTIFACTS_DIR: &str = "artifacts";
const INTERPRETERS_DIR: &str = "interpreters";

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache I/O error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl CacheError {
  fn io(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// What an artifact is. The interpreter sorts before every package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
  Interpreter,
  Package(String),
}

impl fmt::Display for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Artifact::Interpreter => write!(f, "interpreter"),
      Artifact::Package(name) => write!(f, "{}", name),
    }
  }
}

/// Identity of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
  pub artifact: Artifact,
  pub version: Version,
  pub checksum: String,
  pub filename: String,
}

impl ArtifactKey {
  /// Key an artifact, deriving its file name from the URL it comes from.
  pub fn new(artifact: Artifact, version: &Version, checksum: &str, url: &str) -> Self {
    Self {
      artifact,
      version: version.clone(),
      checksum: checksum.to_string(),
      filename: artifact_filename(url),
    }
  }
}

/// Outcome of looking up a key.
#[derive(Debug)]
pub enum Lookup {
  Hit(PathBuf),
  Miss,
  /// The file exists but its content does not hash to the key's checksum.
  Mismatch { path: PathBuf, actual: ContentHash },
}

/// Size summary of a cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
  pub artifacts: usize,
  pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
  root: PathBuf,
}

impl ArtifactCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
    let base = match &key.artifact {
      Artifact::Interpreter => self.root.join(INTERPRETERS_DIR),
      Artifact::Package(name) => self.root.join(ARTIFACTS_DIR).join(name),
    };
    base
      .join(key.version.to_string())
      .join(&key.checksum)
      .join(&key.filename)
  }

  /// Look up an artifact, verifying the cached bytes against the key.
  pub fn lookup(&self, key: &ArtifactKey) -> Result<Lookup, CacheError> {
    let path = self.path_for(key);
    if !path.is_file() {
      debug!(artifact = %key.artifact, version = %key.version, "cache miss");
      return Ok(Lookup::Miss);
    }

    let actual = hash_file(&path).map_err(CacheError::io(&path))?;
    if actual.as_str() == key.checksum {
      debug!(artifact = %key.artifact, version = %key.version, "cache hit");
      Ok(Lookup::Hit(path))
    } else {
      Ok(Lookup::Mismatch { path, actual })
    }
  }

  /// A temporary file next to the key's final location.
  pub fn temp_file(&self, key: &ArtifactKey) -> Result<NamedTempFile, CacheError> {
    let path = self.path_for(key);
    let dir = path.parent().unwrap_or(&self.root);
    std::fs::create_dir_all(dir).map_err(CacheError::io(dir))?;
    NamedTempFile::new_in(dir).map_err(CacheError::io(dir))
  }

  /// Move a fully written, verified temporary file into place.
  pub fn commit(&self, key: &ArtifactKey, temp: NamedTempFile) -> Result<PathBuf, CacheError> {
    let path = self.path_for(key);
    temp.as_file().sync_all().map_err(CacheError::io(&path))?;
    temp.persist(&path).map_err(|e| CacheError::Io {
      path: path.clone(),
      source: e.error,
    })?;
    info!(artifact = %key.artifact, version = %key.version, "cached artifact");
    Ok(path)
  }

  pub fn index_path(&self) -> PathBuf {
    self.root.join(INDEX_FILENAME)
  }

  pub fn store_index(&self, bytes: &[u8]) -> Result<(), CacheError> {
    let path = self.index_path();
    write_atomic(&path, bytes).map_err(CacheError::io(&path))
  }

  /// The last index snapshot fetched from a mirror, if any.
  pub fn cached_index(&self) -> Result<Option<Vec<u8>>, CacheError> {
    let path = self.index_path();
    match std::fs::read(&path) {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(CacheError::io(&path)(e)),
    }
  }

  pub fn stats(&self) -> Result<CacheStats, CacheError> {
    let mut stats = CacheStats::default();
    for dir in self.namespaces() {
      if dir.is_dir() {
        tally(&dir, &mut stats)?;
      }
    }
    Ok(stats)
  }

  fn namespaces(&self) -> [PathBuf; 2] {
    [self.root.join(INTERPRETERS_DIR), self.root.join(ARTIFACTS_DIR)]
  }

  /// Remove every artifact and the cached index snapshot.
  ///
  /// Callers must hold the exclusive [`CacheLock`].
  pub fn clear(&self, _lock: &CacheLock) -> Result<CacheStats, CacheError> {
    let stats = self.stats()?;

    for dir in self.namespaces() {
      if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(CacheError::io(&dir))?;
      }
    }
    let index = self.index_path();
    if index.exists() {
      std::fs::remove_file(&index).map_err(CacheError::io(&index))?;
    }

    info!(artifacts = stats.artifacts, bytes = stats.bytes, "cache cleared");
    Ok(stats)
  }
}

fn tally(dir: &Path, stats: &mut CacheStats) -> Result<(), CacheError> {
  for entry in WalkDir::new(dir) {
    let entry = entry.map_err(|e| CacheError::Io {
      path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
      source: e.into(),
    })?;
    if entry.file_type().is_file() && !is_temp_name(entry.file_name()) {
      let meta = entry.metadata().map_err(|e| CacheError::Io {
        path: entry.path().to_path_buf(),
        source: e.into(),
      })?;
      stats.artifacts += 1;
      stats.bytes += meta.len();
    }
  }
  Ok(())
}

fn is_temp_name(name: &std::ffi::OsStr) -> bool {
  name.to_str().is_some_and(|n| n.starts_with(".tmp"))
}

/// Derive a safe file name from an artifact URL.
///
/// Takes the last path segment without query string, replacing anything
/// outside `[A-Za-z0-9._-]`. The extension is kept because unpacking is
/// chosen by it. Falls back to a hash of the URL.
pub fn artifact_filename(url: &str) -> String {
  let last = url.split(['?', '#']).next().unwrap_or(url).rsplit(['/', '\\']).next().unwrap_or("");

  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
        c
      } else {
        '_'
      }
    })
    .collect();

  if !sanitized.is_empty() && sanitized.trim_matches('.').len() == sanitized.len() {
    return sanitized;
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("artifact_{}", &hex::encode(hasher.finalize())[..16])
}
