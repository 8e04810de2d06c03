//! Package index snapshots.
//!
//! An index snapshot is a JSON document listing every interpreter runtime and
//! package release a mirror offers, with artifact URLs, checksums and each
//! release's declared dependencies. Resolution only ever looks at one fixed
//! snapshot, which is what makes it reproducible.

use std::collections::BTreeMap;

use semver::Version;
use serde::Deserialize;
use thiserror::Error;

use crate::manifest::{is_valid_name, normalize_name};
use crate::util::hash::is_valid_checksum;
use crate::version::{Constraint, VersionError, parse_version};

/// Snapshot format understood by this version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("failed to parse index snapshot: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("unsupported index format version {found} (expected {})", INDEX_FORMAT_VERSION)]
  UnsupportedFormat { found: u32 },

  #[error("invalid package name '{0}' in index")]
  InvalidName(String),

  #[error("invalid index entry for {name}: {source}")]
  Version {
    name: String,
    #[source]
    source: VersionError,
  },

  #[error("invalid checksum for {name} {version}: expected 64 lowercase hex characters")]
  Checksum { name: String, version: String },

  #[error("{name} {version} is listed more than once")]
  DuplicateRelease { name: String, version: Version },
}

/// An interpreter runtime artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterRelease {
  pub version: Version,
  pub url: String,
  pub checksum: String,
}

/// One version of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
  /// Name as spelled in the index.
  pub name: String,
  pub version: Version,
  pub url: String,
  pub checksum: String,
  /// Keyed by normalized package name.
  pub dependencies: BTreeMap<String, Constraint>,
  pub requires_interpreter: Option<Constraint>,
}

/// A validated index snapshot.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
  /// Newest first.
  interpreters: Vec<InterpreterRelease>,
  /// Keyed by normalized name, releases newest first.
  packages: BTreeMap<String, Vec<Release>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIndex {
  version: u32,
  #[serde(default)]
  interpreters: Vec<RawArtifact>,
  #[serde(default)]
  packages: BTreeMap<String, Vec<RawRelease>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArtifact {
  version: String,
  url: String,
  checksum: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelease {
  version: String,
  url: String,
  checksum: String,
  #[serde(default)]
  dependencies: BTreeMap<String, String>,
  requires_interpreter: Option<String>,
}

impl PackageIndex {
  pub fn from_json(bytes: &[u8]) -> Result<Self, IndexError> {
    let raw: RawIndex = serde_json::from_slice(bytes)?;
    if raw.version != INDEX_FORMAT_VERSION {
      return Err(IndexError::UnsupportedFormat { found: raw.version });
    }

    let mut interpreters = Vec::with_capacity(raw.interpreters.len());
    for artifact in raw.interpreters {
      let version = parse_version(&artifact.version).map_err(|source| IndexError::Version {
        name: "interpreter".to_string(),
        source,
      })?;
      check_checksum("interpreter", &artifact.version, &artifact.checksum)?;
      if interpreters.iter().any(|i: &InterpreterRelease| i.version == version) {
        return Err(IndexError::DuplicateRelease {
          name: "interpreter".to_string(),
          version,
        });
      }
      interpreters.push(InterpreterRelease {
        version,
        url: artifact.url,
        checksum: artifact.checksum,
      });
    }
    interpreters.sort_by(|a, b| b.version.cmp(&a.version));

    let mut packages: BTreeMap<String, Vec<Release>> = BTreeMap::new();
    for (name, raw_releases) in raw.packages {
      if !is_valid_name(&name) {
        return Err(IndexError::InvalidName(name));
      }
      let releases = packages.entry(normalize_name(&name)).or_default();
      for raw in raw_releases {
        let release = Self::release(&name, raw)?;
        if releases.iter().any(|r| r.version == release.version) {
          return Err(IndexError::DuplicateRelease {
            name,
            version: release.version,
          });
        }
        releases.push(release);
      }
      releases.sort_by(|a, b| b.version.cmp(&a.version));
    }

    Ok(Self { interpreters, packages })
  }

  fn release(name: &str, raw: RawRelease) -> Result<Release, IndexError> {
    let version_err = |source| IndexError::Version {
      name: format!("{} {}", name, raw.version),
      source,
    };

    let version = parse_version(&raw.version).map_err(version_err)?;
    check_checksum(name, &raw.version, &raw.checksum)?;

    let mut dependencies = BTreeMap::new();
    for (dep, constraint) in &raw.dependencies {
      if !is_valid_name(dep) {
        return Err(IndexError::InvalidName(dep.clone()));
      }
      dependencies.insert(normalize_name(dep), Constraint::parse(constraint).map_err(version_err)?);
    }

    let requires_interpreter = raw
      .requires_interpreter
      .as_deref()
      .map(Constraint::parse)
      .transpose()
      .map_err(version_err)?;

    Ok(Release {
      name: name.to_string(),
      version,
      url: raw.url,
      checksum: raw.checksum,
      dependencies,
      requires_interpreter,
    })
  }

  /// Releases of a package, newest first.
  pub fn releases(&self, name: &str) -> Option<&[Release]> {
    self.packages.get(&normalize_name(name)).map(Vec::as_slice)
  }

  /// Interpreter runtimes, newest first.
  pub fn interpreters(&self) -> &[InterpreterRelease] {
    &self.interpreters
  }

  pub fn package_count(&self) -> usize {
    self.packages.len()
  }
}

fn check_checksum(name: &str, version: &str, checksum: &str) -> Result<(), IndexError> {
  if is_valid_checksum(checksum) {
    Ok(())
  } else {
    Err(IndexError::Checksum {
      name: name.to_string(),
      version: version.to_string(),
    })
  }
}
