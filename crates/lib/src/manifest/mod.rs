//! Manifest reading.
//!
//! The manifest (`airpack.toml`) declares what goes into a bundle: the
//! interpreter runtime, the direct package requirements, and the application
//! tree with its entry point. It is read once at the start of a build and is
//! immutable afterwards.

mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::DEFAULT_BUNDLE_NAME;
use crate::prereq::{Prerequisite, PrerequisiteError};
use crate::version::{Constraint, VersionError};

pub use types::*;

/// Errors that can occur while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("manifest does not declare an interpreter version ([interpreter] version = \"...\")")]
  MissingInterpreter,

  #[error("package '{name}' is declared more than once")]
  DuplicatePackage { name: String },

  #[error("invalid package name '{0}'")]
  InvalidName(String),

  #[error("invalid bundle name '{0}'")]
  InvalidBundleName(String),

  #[error("invalid version constraint for '{name}': {source}")]
  Constraint {
    name: String,
    #[source]
    source: VersionError,
  },

  #[error("manifest does not declare an application entry point ([app] entry = \"...\")")]
  MissingEntry,

  #[error("application entry '{0}' must be a relative path inside the app source")]
  InvalidEntry(String),

  #[error("invalid [build] require: {0}")]
  InvalidRequire(#[source] PrerequisiteError),
}

impl Manifest {
  /// Read and validate a manifest file.
  ///
  /// Relative paths inside the manifest are resolved against the directory
  /// containing it.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    let root = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));

    Self::parse(&content, &root).map_err(|e| match e {
      ManifestError::Parse { source, .. } => ManifestError::Parse {
        path: path.to_path_buf(),
        source,
      },
      other => other,
    })
  }

  /// Parse manifest text; `root` is the directory relative paths hang off.
  pub fn parse(content: &str, root: &Path) -> Result<Self, ManifestError> {
    let raw: RawManifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
      path: PathBuf::new(),
      source: Box::new(e),
    })?;

    let bundle_name = raw
      .bundle
      .and_then(|b| b.name)
      .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.to_string());
    if !is_valid_name(&bundle_name) {
      return Err(ManifestError::InvalidBundleName(bundle_name));
    }

    let raw_interpreter = raw.interpreter.ok_or(ManifestError::MissingInterpreter)?;
    let version = raw_interpreter.version.ok_or(ManifestError::MissingInterpreter)?;
    let interpreter = InterpreterSpec {
      version: Constraint::parse(&version).map_err(|source| ManifestError::Constraint {
        name: "interpreter".to_string(),
        source,
      })?,
      executable: raw_interpreter
        .executable
        .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string()),
      path_var: raw_interpreter.path_var.unwrap_or_else(|| DEFAULT_PATH_VAR.to_string()),
    };

    let mut seen = BTreeMap::new();
    let mut packages = Vec::with_capacity(raw.packages.len());
    for raw_pkg in raw.packages {
      if !is_valid_name(&raw_pkg.name) {
        return Err(ManifestError::InvalidName(raw_pkg.name));
      }
      if seen.insert(normalize_name(&raw_pkg.name), ()).is_some() {
        return Err(ManifestError::DuplicatePackage { name: raw_pkg.name });
      }
      let constraint = match raw_pkg.version {
        Some(v) => Constraint::parse(&v).map_err(|source| ManifestError::Constraint {
          name: raw_pkg.name.clone(),
          source,
        })?,
        None => Constraint::any(),
      };
      packages.push(Requirement {
        name: raw_pkg.name,
        constraint,
        optional: raw_pkg.optional,
      });
    }

    let raw_app = raw.app.unwrap_or_default();
    let entry = raw_app.entry.ok_or(ManifestError::MissingEntry)?;
    let entry_path = PathBuf::from(&entry);
    if crate::util::fs::to_portable(&entry_path).is_none_or(|p| p.is_empty()) {
      return Err(ManifestError::InvalidEntry(entry));
    }
    let app = AppSpec {
      source: root.join(raw_app.source.unwrap_or_else(|| PathBuf::from(DEFAULT_APP_SOURCE))),
      entry: entry_path,
      exclude: raw_app
        .exclude
        .unwrap_or_else(|| DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()),
      config: raw_app.config.unwrap_or_default(),
      templates: raw_app
        .templates
        .into_iter()
        .map(|t| ExtraTemplate {
          file: t.file,
          source: root.join(t.source),
        })
        .collect(),
    };

    let build = raw.build.unwrap_or_default();
    let prerequisite = build
      .require
      .as_deref()
      .map(str::parse::<Prerequisite>)
      .transpose()
      .map_err(ManifestError::InvalidRequire)?;

    debug!(
      bundle = %bundle_name,
      packages = packages.len(),
      interpreter = %interpreter.version,
      "manifest parsed"
    );

    Ok(Self {
      bundle_name,
      interpreter,
      packages,
      app,
      build,
      prerequisite,
      root: root.to_path_buf(),
    })
  }
}

/// Normalize a package name for comparison.
///
/// Lowercases and collapses runs of `-`, `_` and `.` into a single `-`, so
/// `Foo_Bar`, `foo-bar` and `foo.bar` name the same package.
pub fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut last_sep = false;
  for c in name.chars() {
    if matches!(c, '-' | '_' | '.') {
      if !last_sep {
        out.push('-');
      }
      last_sep = true;
    } else {
      out.push(c.to_ascii_lowercase());
      last_sep = false;
    }
  }
  out
}

/// Whether `name` is usable as a package or bundle name.
///
/// Names become directory names inside the bundle, so only ASCII
/// alphanumerics and `-`, `_`, `.` are allowed, starting and ending with an
/// alphanumeric.
pub fn is_valid_name(name: &str) -> bool {
  let bytes = name.as_bytes();
  match (bytes.first(), bytes.last()) {
    (Some(first), Some(last)) if first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric() => bytes
      .iter()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')),
    _ => false,
  }
}
