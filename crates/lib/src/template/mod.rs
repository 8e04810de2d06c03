//! Generated files at the root of the bundle.
//!
//! - the configuration template, with inert placeholders
//! - extra templates declared in the manifest, copied verbatim
//! - `run.bat` / `start.bat` launchers
//! - `README.md` and `version_info.json`
//! - `bundle.lock`, the resolved graph the bundle was built from

pub mod config;
pub mod info;
pub mod launcher;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::LOCK_FILENAME;
use crate::manifest::Manifest;
use crate::resolve::ResolvedGraph;
use crate::stage::{APP_DIR, RUNTIME_DIR, StagedTree, VENDOR_DIR};

/// Names at the bundle root that user templates may not take.
pub const RESERVED_NAMES: [&str; 8] = [
  launcher::RUN_SCRIPT,
  launcher::START_SCRIPT,
  info::README_FILE,
  info::VERSION_INFO_FILE,
  LOCK_FILENAME,
  RUNTIME_DIR,
  VENDOR_DIR,
  APP_DIR,
];

#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("config file name '{0}' must be a plain file name")]
  InvalidFileName(String),

  #[error("'{0}' is reserved for a generated bundle file")]
  ReservedFileName(String),

  #[error("'{0}' is declared as more than one template")]
  DuplicateFileName(String),

  #[error("failed to read template {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to render YAML: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("failed to render JSON: {0}")]
  Json(#[from] serde_json::Error),
}

/// Write every generated file into the staged tree.
///
/// Returns the names written, in order.
pub fn write_bundle_files(
  tree: &StagedTree,
  manifest: &Manifest,
  graph: &ResolvedGraph,
) -> Result<Vec<String>, TemplateError> {
  let config_name = &manifest.app.config.file;
  let mut user_files = vec![config_name.as_str()];
  user_files.extend(manifest.app.templates.iter().map(|t| t.file.as_str()));
  check_user_names(&user_files)?;

  let packages = || graph.packages.keys().map(String::as_str);
  let mut version_info = serde_json::to_string_pretty(&info::VersionInfo::new(manifest, graph))?;
  version_info.push('\n');

  let mut files = vec![(config_name.clone(), config::render(&manifest.app.config)?)];
  for template in &manifest.app.templates {
    let content = fs::read_to_string(&template.source).map_err(|source| TemplateError::Read {
      path: template.source.clone(),
      source,
    })?;
    files.push((template.file.clone(), content));
  }
  files.extend([
    (launcher::RUN_SCRIPT.to_string(), launcher::run_script(manifest, packages())),
    (launcher::START_SCRIPT.to_string(), launcher::start_script(manifest, packages())),
    (info::README_FILE.to_string(), info::readme(manifest, graph)),
    (info::VERSION_INFO_FILE.to_string(), version_info),
    (LOCK_FILENAME.to_string(), graph.to_json()?),
  ]);

  let mut written = Vec::with_capacity(files.len());
  for (name, content) in files {
    write(&tree.root.join(&name), &content)?;
    debug!(file = %name, "wrote bundle file");
    written.push(name);
  }

  info!(files = written.len(), "generated bundle files");
  Ok(written)
}

/// User-named files must be plain, distinct, and clear of generated names.
///
/// Names are compared case-insensitively, as on the Windows targets.
fn check_user_names(names: &[&str]) -> Result<(), TemplateError> {
  let mut seen = Vec::with_capacity(names.len());
  for name in names {
    if !is_plain_file_name(name) {
      return Err(TemplateError::InvalidFileName(name.to_string()));
    }
    let folded = name.to_ascii_lowercase();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(&folded)) {
      return Err(TemplateError::ReservedFileName(name.to_string()));
    }
    if seen.contains(&folded) {
      return Err(TemplateError::DuplicateFileName(name.to_string()));
    }
    seen.push(folded);
  }
  Ok(())
}

fn write(path: &Path, content: &str) -> Result<(), TemplateError> {
  fs::write(path, content).map_err(|source| TemplateError::Write {
    path: path.to_path_buf(),
    source,
  })
}

fn is_plain_file_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', ':'])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolve::ResolvedArtifact;
  use semver::Version;
  use std::collections::BTreeMap;
  use tempfile::TempDir;

  fn graph() -> ResolvedGraph {
    ResolvedGraph {
      interpreter: ResolvedArtifact {
        version: Version::new(3, 11, 9),
        source: "py.zip".to_string(),
        checksum: "4".repeat(64),
      },
      packages: BTreeMap::new(),
      skipped: Default::default(),
    }
  }

  fn tree(temp: &TempDir) -> StagedTree {
    StagedTree {
      root: temp.path().to_path_buf(),
      final_root: temp.path().join("final"),
    }
  }

  #[test]
  fn writes_all_files() {
    let temp = TempDir::new().unwrap();
    let manifest =
      Manifest::parse("[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n", temp.path()).unwrap();

    let written = write_bundle_files(&tree(&temp), &manifest, &graph()).unwrap();

    assert_eq!(
      written,
      ["config.template", "run.bat", "start.bat", "README.md", "version_info.json", "bundle.lock"]
    );
    for name in &written {
      assert!(temp.path().join(name).is_file(), "{name} missing");
    }
    let lock: ResolvedGraph =
      serde_json::from_str(&fs::read_to_string(temp.path().join("bundle.lock")).unwrap()).unwrap();
    assert_eq!(lock, graph());
  }

  #[test]
  fn rejects_config_name_with_separators() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::parse(
      "[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n[app.config]\nfile = \"../x.yml\"\n",
      temp.path(),
    )
    .unwrap();

    assert!(matches!(
      write_bundle_files(&tree(&temp), &manifest, &graph()),
      Err(TemplateError::InvalidFileName(_))
    ));
  }

  #[test]
  fn reserved_names_cannot_be_config_files() {
    let temp = TempDir::new().unwrap();
    for name in ["run.bat", "README.md", "bundle.lock", "Vendor"] {
      let manifest = Manifest::parse(
        &format!(
          "[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n[app.config]\nfile = \"{}\"\n",
          name
        ),
        temp.path(),
      )
      .unwrap();

      assert!(
        matches!(
          write_bundle_files(&tree(&temp), &manifest, &graph()),
          Err(TemplateError::ReservedFileName(n)) if n == name
        ),
        "{name}"
      );
    }
    assert!(!temp.path().join("run.bat").exists());
  }

  #[test]
  fn extra_templates_are_copied_verbatim() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("model.yml"), "- name: openai/your-model-name\n  edit_format: diff\n").unwrap();
    let bundle = temp.path().join("bundle");
    fs::create_dir_all(&bundle).unwrap();
    let manifest = Manifest::parse(
      "[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n\n\
       [[app.template]]\nfile = \".model.settings.yml\"\nsource = \"model.yml\"\n",
      temp.path(),
    )
    .unwrap();
    let tree = StagedTree {
      root: bundle.clone(),
      final_root: temp.path().join("final"),
    };

    let written = write_bundle_files(&tree, &manifest, &graph()).unwrap();

    assert_eq!(written[..2], ["config.template", ".model.settings.yml"]);
    assert_eq!(
      fs::read_to_string(bundle.join(".model.settings.yml")).unwrap(),
      "- name: openai/your-model-name\n  edit_format: diff\n"
    );
  }

  #[test]
  fn template_clashing_with_config_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::parse(
      "[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n\n\
       [[app.template]]\nfile = \"Config.Template\"\nsource = \"x.yml\"\n",
      temp.path(),
    )
    .unwrap();

    assert!(matches!(
      write_bundle_files(&tree(&temp), &manifest, &graph()),
      Err(TemplateError::DuplicateFileName(_))
    ));
  }

  #[test]
  fn missing_template_source_is_read_error() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::parse(
      "[interpreter]\nversion = \"3.11\"\n[app]\nentry = \"main.py\"\n\n\
       [[app.template]]\nfile = \"extra.yml\"\nsource = \"nowhere.yml\"\n",
      temp.path(),
    )
    .unwrap();

    assert!(matches!(
      write_bundle_files(&tree(&temp), &manifest, &graph()),
      Err(TemplateError::Read { .. })
    ));
  }
}
