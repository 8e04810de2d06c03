//! Scaffold a new bundle project.
//!
//! Writes a starter `airpack.toml` and an `app/` directory holding the entry
//! point. Existing files are never overwritten.

mod templates;

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::consts::{DEFAULT_BUNDLE_NAME, MANIFEST_FILENAME};
use crate::manifest::{DEFAULT_APP_SOURCE, is_valid_name};

pub use templates::{MAIN_PY_TEMPLATE, MANIFEST_TEMPLATE};

/// Errors that can occur during initialization.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("file already exists: {}", path.display())]
  PathExists { path: PathBuf },

  #[error("invalid bundle name '{0}'")]
  InvalidBundleName(String),

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error("failed to canonicalize path {}: {source}", path.display())]
  Canonicalize { path: PathBuf, source: std::io::Error },
}

/// Options for initializing a project directory.
pub struct InitOptions {
  /// Directory to create the project in
  pub project_dir: PathBuf,
  /// Bundle name; derived from the directory name when unset
  pub bundle_name: Option<String>,
}

/// Result of a successful initialization.
#[derive(Debug)]
pub struct InitResult {
  /// The project directory (canonicalized)
  pub project_dir: PathBuf,
  pub manifest: PathBuf,
  pub entry: PathBuf,
  pub bundle_name: String,
}

/// Initialize a new bundle project.
///
/// # Errors
///
/// Returns an error if:
/// - `airpack.toml` or `app/main.py` already exist
/// - Directory creation fails
/// - File writing fails
pub fn init(options: &InitOptions) -> Result<InitResult, InitError> {
  if let Some(name) = &options.bundle_name
    && !is_valid_name(name)
  {
    return Err(InitError::InvalidBundleName(name.clone()));
  }

  let project_dir = &options.project_dir;

  fs::create_dir_all(project_dir).map_err(|e| InitError::CreateDir {
    path: project_dir.clone(),
    source: e,
  })?;

  let project_dir = dunce::canonicalize(project_dir).map_err(|e| InitError::Canonicalize {
    path: options.project_dir.clone(),
    source: e,
  })?;

  let manifest = project_dir.join(MANIFEST_FILENAME);
  let app_dir = project_dir.join(DEFAULT_APP_SOURCE);
  let entry = app_dir.join("main.py");

  for path in [&manifest, &entry] {
    if path.exists() {
      return Err(InitError::PathExists { path: path.clone() });
    }
  }

  let bundle_name = options
    .bundle_name
    .clone()
    .unwrap_or_else(|| default_bundle_name(&project_dir));

  fs::create_dir_all(&app_dir).map_err(|e| InitError::CreateDir {
    path: app_dir.clone(),
    source: e,
  })?;

  let content = MANIFEST_TEMPLATE.replace("{bundle_name}", &bundle_name);
  fs::write(&manifest, content).map_err(|e| InitError::WriteFile {
    path: manifest.clone(),
    source: e,
  })?;
  fs::write(&entry, MAIN_PY_TEMPLATE).map_err(|e| InitError::WriteFile {
    path: entry.clone(),
    source: e,
  })?;

  info!(dir = %project_dir.display(), bundle = %bundle_name, "initialized project");

  Ok(InitResult {
    project_dir,
    manifest,
    entry,
    bundle_name,
  })
}

/// The directory name if it is usable as a bundle name.
fn default_bundle_name(dir: &std::path::Path) -> String {
  dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .filter(|n| is_valid_name(n))
    .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.to_string())
}
