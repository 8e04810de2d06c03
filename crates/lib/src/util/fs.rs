//! Filesystem helpers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `contents` to `path` atomically.
///
/// The data goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir)?;

  let mut temp = NamedTempFile::new_in(dir)?;
  temp.write_all(contents)?;
  temp.as_file().sync_all()?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}

/// Whether `path` is an existing directory with at least one entry.
pub fn dir_has_entries(path: &Path) -> io::Result<bool> {
  match fs::read_dir(path) {
    Ok(mut entries) => Ok(entries.next().is_some()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

/// Convert a relative path into a `/`-separated string.
///
/// Returns `None` if any component is not plain UTF-8 (including `..` or a
/// root), which keeps bundle paths portable between hosts.
pub fn to_portable(rel: &Path) -> Option<String> {
  let mut parts = Vec::new();
  for component in rel.components() {
    match component {
      std::path::Component::Normal(part) => parts.push(part.to_str()?),
      std::path::Component::CurDir => {}
      _ => return None,
    }
  }
  Some(parts.join("/"))
}
