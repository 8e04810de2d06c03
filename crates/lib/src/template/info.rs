//! Bundle metadata: `version_info.json` and `README.md`.

use std::collections::BTreeMap;
use std::time::{Duration, UNIX_EPOCH};

use serde::Serialize;

use crate::consts::SOURCE_DATE_EPOCH_ENV;
use crate::manifest::Manifest;
use crate::resolve::ResolvedGraph;

use super::launcher::{RUN_SCRIPT, START_SCRIPT};

pub const VERSION_INFO_FILE: &str = "version_info.json";
pub const README_FILE: &str = "README.md";
pub const TARGET_PLATFORM: &str = "windows-x86_64";

#[derive(Debug, Serialize)]
pub struct VersionInfo {
  pub bundle: String,
  pub interpreter: String,
  pub packages: BTreeMap<String, String>,
  pub target: String,
  pub tool: String,
  /// Only present when `SOURCE_DATE_EPOCH` pins it.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub build_time: Option<String>,
}

impl VersionInfo {
  pub fn new(manifest: &Manifest, graph: &ResolvedGraph) -> Self {
    Self {
      bundle: manifest.bundle_name.clone(),
      interpreter: graph.interpreter.version.to_string(),
      packages: graph
        .packages
        .iter()
        .map(|(name, p)| (name.clone(), p.version.to_string()))
        .collect(),
      target: TARGET_PLATFORM.to_string(),
      tool: concat!("airpack ", env!("CARGO_PKG_VERSION")).to_string(),
      build_time: source_date_epoch(),
    }
  }
}

/// Build time from `SOURCE_DATE_EPOCH`, as RFC 3339.
fn source_date_epoch() -> Option<String> {
  let secs: u64 = std::env::var(SOURCE_DATE_EPOCH_ENV).ok()?.trim().parse().ok()?;
  let time = UNIX_EPOCH.checked_add(Duration::from_secs(secs))?;
  Some(humantime::format_rfc3339_seconds(time).to_string())
}

pub fn readme(manifest: &Manifest, graph: &ResolvedGraph) -> String {
  let keys = &manifest.app.config;
  let mut out = String::new();

  out.push_str(&format!("# {}\n\n", manifest.bundle_name));
  out.push_str("Self-contained offline bundle. No network access is needed to run it.\n\n");

  out.push_str("## Setup\n\n");
  out.push_str("1. Extract the archive anywhere on the target machine.\n");
  out.push_str(&format!(
    "2. Edit `{}` and fill in the settings for your API server:\n",
    keys.file
  ));
  for (key, what) in [
    (&keys.api_base, "base URL of the OpenAI-compatible endpoint"),
    (&keys.api_key, "API key"),
    (&keys.model, "model identifier"),
    (&keys.timeout, "request timeout in seconds"),
    (&keys.proxy, "HTTP proxy, if one is required"),
  ] {
    if !key.is_empty() {
      out.push_str(&format!("   - `{}`: {}\n", key, what));
    }
  }
  out.push_str(&format!("3. Run `{}`, or open a console with `{}`.\n\n", RUN_SCRIPT, START_SCRIPT));

  out.push_str("## Contents\n\n");
  out.push_str(&format!("- runtime: {}\n", graph.interpreter.version));
  for (name, package) in &graph.packages {
    out.push_str(&format!("- {} {}\n", name, package.version));
  }
  if !graph.skipped.is_empty() {
    out.push_str("\n## Not included\n\n");
    out.push_str("These optional packages could not be bundled; the features that need them are unavailable:\n\n");
    for name in &graph.skipped {
      out.push_str(&format!("- {}\n", name));
    }
  }
  out
}
