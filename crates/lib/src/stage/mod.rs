//! Stage assembly.
//!
//! Lays out the bundle tree inside the output directory:
//!
//! ```text
//! <output>/<bundle>.partial/
//! ├── runtime/            interpreter runtime
//! ├── vendor/<package>/   one directory per resolved package
//! └── app/                application source
//! ```
//!
//! The tree is built under a `.partial` name and only renamed to its final
//! name once the whole build has succeeded. An [`OutputDir`] removes every
//! partial path it handed out if it is dropped before that point.

mod unpack;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::PARTIAL_SUFFIX;
use crate::manifest::{AppSpec, Manifest};
use crate::util::fs::dir_has_entries;
use crate::vendor::Vendored;

pub use unpack::{ArtifactKind, UnpackError, unpack_artifact};

pub const RUNTIME_DIR: &str = "runtime";
pub const VENDOR_DIR: &str = "vendor";
pub const APP_DIR: &str = "app";

#[derive(Debug, Error)]
pub enum StageError {
  #[error("application source directory not found: {}", path.display())]
  MissingAppSource { path: PathBuf },

  #[error("application entry point not found: {}", path.display())]
  MissingEntry { path: PathBuf },

  #[error("output directory {} is not empty (use --clean to replace its contents)", path.display())]
  OutputNotEmpty { path: PathBuf },

  #[error("refusing to clean {}: it contains the project at {}", output.display(), project.display())]
  OutputContainsProject { output: PathBuf, project: PathBuf },

  #[error("cannot prepare output directory {}: {source}", path.display())]
  PrepareOutput {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to unpack {name}: {source}")]
  Unpack {
    name: String,
    #[source]
    source: UnpackError,
  },

  #[error("failed to copy {}: {source}", path.display())]
  Copy {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{} is a symlink to {}, which does not stay inside the bundle", path.display(), target.display())]
  NotRelocatable { path: PathBuf, target: PathBuf },
}

/// The build output directory, with cleanup of unfinished outputs.
#[derive(Debug)]
pub struct OutputDir {
  root: PathBuf,
  created: bool,
  partials: Vec<PathBuf>,
  armed: bool,
}

impl OutputDir {
  /// Claim `root` for a build.
  ///
  /// A missing directory is created. An existing, non-empty one is refused
  /// unless `clean` is set, in which case its contents are removed first.
  pub fn prepare(root: &Path, clean: bool) -> Result<Self, StageError> {
    let prepare_err = |source| StageError::PrepareOutput {
      path: root.to_path_buf(),
      source,
    };

    let existed = root.exists();
    if existed && !root.is_dir() {
      return Err(prepare_err(io::Error::other("exists and is not a directory")));
    }

    if dir_has_entries(root).map_err(prepare_err)? {
      if !clean {
        return Err(StageError::OutputNotEmpty {
          path: root.to_path_buf(),
        });
      }
      info!(path = %root.display(), "cleaning output directory");
      for entry in fs::read_dir(root).map_err(prepare_err)? {
        let path = entry.map_err(prepare_err)?.path();
        let removed = if path.is_dir() && !path.is_symlink() {
          fs::remove_dir_all(&path)
        } else {
          fs::remove_file(&path)
        };
        removed.map_err(prepare_err)?;
      }
    }

    fs::create_dir_all(root).map_err(prepare_err)?;
    Ok(Self {
      root: root.to_path_buf(),
      created: !existed,
      partials: Vec::new(),
      armed: true,
    })
  }

  /// Like [`OutputDir::prepare`], but never cleans a directory that holds
  /// `project`, the directory of the manifest being built.
  pub fn prepare_for(root: &Path, clean: bool, project: &Path) -> Result<Self, StageError> {
    if clean
      && let (Ok(output), Ok(project)) = (dunce::canonicalize(root), dunce::canonicalize(project))
      && project.starts_with(&output)
    {
      return Err(StageError::OutputContainsProject { output, project });
    }
    Self::prepare(root, clean)
  }

  pub fn path(&self) -> &Path {
    &self.root
  }

  /// The in-progress path for `name`, removed again if the build fails.
  pub fn partial(&mut self, name: &str) -> PathBuf {
    let path = self.root.join(format!("{}{}", name, PARTIAL_SUFFIX));
    self.partials.push(path.clone());
    path
  }

  /// Keep everything; called once all outputs are in their final place.
  pub fn disarm(mut self) {
    self.armed = false;
  }
}

impl Drop for OutputDir {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    for path in &self.partials {
      let result = if path.is_dir() {
        fs::remove_dir_all(path)
      } else if path.exists() {
        fs::remove_file(path)
      } else {
        Ok(())
      };
      if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to remove partial output");
      }
    }
    if self.created && matches!(dir_has_entries(&self.root), Ok(false)) {
      let _ = fs::remove_dir(&self.root);
    }
    debug!(path = %self.root.display(), "cleaned up unfinished build output");
  }
}

/// A fully assembled staging tree.
#[derive(Debug, Clone)]
pub struct StagedTree {
  /// The `.partial` directory being assembled.
  pub root: PathBuf,
  /// Where `root` moves once the build succeeds.
  pub final_root: PathBuf,
}

/// Check that the application source and entry point exist.
pub fn validate_app(app: &AppSpec) -> Result<(), StageError> {
  if !app.source.is_dir() {
    return Err(StageError::MissingAppSource {
      path: app.source.clone(),
    });
  }
  let entry = app.source.join(&app.entry);
  if !entry.is_file() {
    return Err(StageError::MissingEntry { path: entry });
  }
  Ok(())
}

/// Assemble runtime, vendored packages and application into a fresh tree.
pub fn assemble(manifest: &Manifest, vendored: &Vendored, output: &mut OutputDir) -> Result<StagedTree, StageError> {
  validate_app(&manifest.app)?;

  let final_root = output.path().join(&manifest.bundle_name);
  let root = output.partial(&manifest.bundle_name);
  fs::create_dir_all(&root).map_err(|source| StageError::PrepareOutput {
    path: root.clone(),
    source,
  })?;

  unpack_artifact(&vendored.interpreter.path, &root.join(RUNTIME_DIR)).map_err(|source| StageError::Unpack {
    name: "interpreter".to_string(),
    source,
  })?;

  let vendor = root.join(VENDOR_DIR);
  fs::create_dir_all(&vendor).map_err(|source| StageError::PrepareOutput {
    path: vendor.clone(),
    source,
  })?;
  for (name, artifact) in &vendored.packages {
    unpack_artifact(&artifact.path, &vendor.join(name)).map_err(|source| StageError::Unpack {
      name: name.clone(),
      source,
    })?;
    debug!(package = %name, version = %artifact.version, "staged package");
  }

  let copied = copy_app(&manifest.app, &root.join(APP_DIR))?;
  check_relocatable(&root)?;

  info!(
    root = %root.display(),
    packages = vendored.packages.len(),
    app_files = copied,
    "staged bundle tree"
  );
  Ok(StagedTree { root, final_root })
}

/// Copy the application tree, skipping excluded names and symlinks.
fn copy_app(app: &AppSpec, dest: &Path) -> Result<usize, StageError> {
  let copy_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| StageError::Copy { path, source }
  };

  let mut copied = 0;
  let walker = WalkDir::new(&app.source)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.depth() == 0 || !is_excluded(&e.file_name().to_string_lossy(), &app.exclude));

  for entry in walker {
    let entry = entry.map_err(|e| StageError::Copy {
      path: e.path().map(Path::to_path_buf).unwrap_or_else(|| app.source.clone()),
      source: e.into(),
    })?;
    let relative = entry.path().strip_prefix(&app.source).unwrap_or(entry.path());
    let target = dest.join(relative);

    if entry.path_is_symlink() {
      warn!(path = %entry.path().display(), "skipping symlink in application source");
    } else if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(copy_err(&target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(copy_err(entry.path()))?;
      copied += 1;
    }
  }
  Ok(copied)
}

/// Whether `name` matches one of the exclude patterns.
///
/// Patterns are exact names, `*suffix` or `prefix*`.
pub fn is_excluded(name: &str, patterns: &[String]) -> bool {
  patterns.iter().any(|pattern| {
    if let Some(suffix) = pattern.strip_prefix('*') {
      name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
      name.starts_with(prefix)
    } else {
      name == pattern
    }
  })
}

/// Reject symlinks that point at absolute paths or outside the tree.
pub fn check_relocatable(root: &Path) -> Result<(), StageError> {
  for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
    if !entry.path_is_symlink() {
      continue;
    }
    let target = fs::read_link(entry.path()).map_err(|source| StageError::Copy {
      path: entry.path().to_path_buf(),
      source,
    })?;
    let base = entry.path().parent().unwrap_or(root);
    if target.is_absolute() || !stays_within(root, base, &target) {
      return Err(StageError::NotRelocatable {
        path: entry.path().to_path_buf(),
        target,
      });
    }
  }
  Ok(())
}

fn stays_within(root: &Path, base: &Path, target: &Path) -> bool {
  let Ok(relative_base) = base.strip_prefix(root) else {
    return false;
  };
  let mut depth = relative_base.components().count() as isize;
  for component in target.components() {
    match component {
      std::path::Component::ParentDir => depth -= 1,
      std::path::Component::Normal(_) => depth += 1,
      std::path::Component::CurDir => {}
      _ => return false,
    }
    if depth < 0 {
      return false;
    }
  }
  true
}
