use crate::consts::{APP_NAME, CACHE_DIR_ENV};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for cache files for the application
///
/// `AIRPACK_CACHE_DIR` takes precedence over the platform convention.
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  let local_appdata = std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"));
  local_appdata.join(APP_NAME).join("Cache")
}

/// Returns the directory for cache files for the application
///
/// `AIRPACK_CACHE_DIR` takes precedence over the platform convention.
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}
