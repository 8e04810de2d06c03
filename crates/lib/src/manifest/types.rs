use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::BuildSection;
use crate::prereq::Prerequisite;
use crate::version::Constraint;

pub const DEFAULT_EXECUTABLE: &str = "python.exe";
pub const DEFAULT_PATH_VAR: &str = "PYTHONPATH";
pub const DEFAULT_APP_SOURCE: &str = "app";
pub const DEFAULT_EXCLUDES: [&str; 3] = ["__pycache__", "*.pyc", ".git"];

/// A validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
  pub bundle_name: String,
  pub interpreter: InterpreterSpec,
  /// Direct requirements in declaration order.
  pub packages: Vec<Requirement>,
  pub app: AppSpec,
  pub build: BuildSection,
  /// Tool the build machine must have, from `[build] require`.
  pub prerequisite: Option<Prerequisite>,
  /// Directory containing the manifest.
  pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InterpreterSpec {
  pub version: Constraint,
  /// Executable inside `runtime/` that the launchers invoke.
  pub executable: String,
  /// Environment variable the launchers point at `vendor/` and `app/`.
  pub path_var: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
  pub name: String,
  pub constraint: Constraint,
  /// Included only if it resolves and fetches; otherwise skipped with a warning.
  pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct AppSpec {
  /// Absolute (or manifest-relative, already joined) source directory.
  pub source: PathBuf,
  /// Entry point relative to `source`.
  pub entry: PathBuf,
  pub exclude: Vec<String>,
  pub config: ConfigKeys,
  /// Extra files copied verbatim to the bundle root.
  pub templates: Vec<ExtraTemplate>,
}

/// A user-supplied file placed next to the generated config template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraTemplate {
  /// Plain file name at the bundle root.
  pub file: String,
  /// Already joined onto the manifest directory.
  pub source: PathBuf,
}

/// Key names the target application reads from its config file.
///
/// An empty key name leaves that setting out of the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigKeys {
  pub file: String,
  pub api_base: String,
  pub api_key: String,
  pub model: String,
  pub timeout: String,
  pub proxy: String,
}

impl Default for ConfigKeys {
  fn default() -> Self {
    Self {
      file: "config.template".to_string(),
      api_base: "openai-api-base".to_string(),
      api_key: "openai-api-key".to_string(),
      model: "model".to_string(),
      timeout: "timeout".to_string(),
      proxy: "proxy".to_string(),
    }
  }
}

// On-disk shape. Everything is optional here so that validation can report
// a specific ManifestError instead of a generic deserialization failure.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawManifest {
  pub bundle: Option<RawBundle>,
  pub interpreter: Option<RawInterpreter>,
  #[serde(default, rename = "package")]
  pub packages: Vec<RawPackage>,
  pub app: Option<RawApp>,
  pub build: Option<BuildSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawBundle {
  pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawInterpreter {
  pub version: Option<String>,
  pub executable: Option<String>,
  pub path_var: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawPackage {
  pub name: String,
  pub version: Option<String>,
  #[serde(default)]
  pub optional: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawApp {
  pub source: Option<PathBuf>,
  pub entry: Option<String>,
  pub exclude: Option<Vec<String>>,
  pub config: Option<ConfigKeys>,
  #[serde(default, rename = "template")]
  pub templates: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawTemplate {
  pub file: String,
  pub source: PathBuf,
}
