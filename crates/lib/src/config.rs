//! Build configuration.
//!
//! Settings are layered, later layers winning:
//! 1. built-in defaults
//! 2. the manifest's `[build]` table
//! 3. environment (`AIRPACK_MIRROR`, `AIRPACK_CACHE_DIR`)
//! 4. command-line overrides
//!
//! Paths in the manifest are relative to the manifest directory; paths from
//! the environment or command line are taken as given.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  CACHE_DIR_ENV, DEFAULT_OUTPUT_DIR, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS, MIRROR_ENV,
};
use crate::fetch::{Mirror, MirrorError};
use crate::manifest::Manifest;
use crate::package::ArchiveFormat;
use crate::platform::paths;

/// The `[build]` table of a manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
  pub mirror: Option<String>,
  pub index: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub output: Option<PathBuf>,
  pub workers: Option<usize>,
  /// Humantime duration such as `30s` or `2m`.
  pub timeout: Option<String>,
  pub retries: Option<u32>,
  pub format: Option<ArchiveFormat>,
  /// Tool the build machine must have, as `command@minimum`.
  pub require: Option<String>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
  pub mirror: Option<String>,
  pub index: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub output_dir: Option<PathBuf>,
  pub workers: Option<usize>,
  pub timeout: Option<Duration>,
  pub retries: Option<u32>,
  pub format: Option<ArchiveFormat>,
  /// Empty a non-empty output directory instead of refusing it.
  pub clean: bool,
}

/// Fully resolved settings for one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  pub mirror: Option<Mirror>,
  pub index: Option<PathBuf>,
  pub cache_dir: PathBuf,
  pub output_dir: PathBuf,
  pub workers: usize,
  pub timeout: Duration,
  pub retries: u32,
  pub format: ArchiveFormat,
  pub clean: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid timeout '{value}': {source}")]
  InvalidTimeout {
    value: String,
    #[source]
    source: humantime::DurationError,
  },

  #[error("worker count must be at least 1")]
  InvalidWorkers,

  #[error(transparent)]
  Mirror(#[from] MirrorError),
}

impl BuildConfig {
  pub fn resolve(manifest: &Manifest, overrides: &BuildOverrides) -> Result<Self, ConfigError> {
    let section = &manifest.build;
    let root = &manifest.root;

    let mirror = if let Some(value) = &overrides.mirror {
      Some(Mirror::parse(value, None)?)
    } else if let Ok(value) = std::env::var(MIRROR_ENV)
      && !value.is_empty()
    {
      Some(Mirror::parse(&value, None)?)
    } else if let Some(value) = &section.mirror {
      Some(Mirror::parse(value, Some(root))?)
    } else {
      None
    };

    let index = overrides
      .index
      .clone()
      .or_else(|| section.index.as_ref().map(|p| root.join(p)));

    let cache_dir = match &overrides.cache_dir {
      Some(dir) => dir.clone(),
      None if std::env::var_os(CACHE_DIR_ENV).is_some() => paths::cache_dir(),
      None => section
        .cache_dir
        .as_ref()
        .map(|p| root.join(p))
        .unwrap_or_else(paths::cache_dir),
    };

    let output_dir = overrides
      .output_dir
      .clone()
      .unwrap_or_else(|| root.join(section.output.as_deref().unwrap_or(DEFAULT_OUTPUT_DIR.as_ref())));

    let workers = overrides.workers.or(section.workers).unwrap_or(DEFAULT_WORKERS);
    if workers == 0 {
      return Err(ConfigError::InvalidWorkers);
    }

    let timeout = match (overrides.timeout, &section.timeout) {
      (Some(timeout), _) => timeout,
      (None, Some(value)) => humantime::parse_duration(value).map_err(|source| ConfigError::InvalidTimeout {
        value: value.clone(),
        source,
      })?,
      (None, None) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    };

    let config = Self {
      mirror,
      index,
      cache_dir,
      output_dir,
      workers,
      timeout,
      retries: overrides.retries.or(section.retries).unwrap_or(DEFAULT_RETRIES),
      format: overrides.format.or(section.format).unwrap_or_default(),
      clean: overrides.clean,
    };

    debug!(?config, "build configuration resolved");
    Ok(config)
  }
}
