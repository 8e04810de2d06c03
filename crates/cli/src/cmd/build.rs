//! Implementation of the `airpack build` command.
//!
//! Runs the whole pipeline, printing each stage as it starts, and finishes
//! with the instructions for using the bundle on the target machine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use airpack_lib::config::BuildOverrides;
use airpack_lib::consts::MANIFEST_FILENAME;
use airpack_lib::package::ArchiveFormat;
use airpack_lib::pipeline::{BuildOutcome, BuildRequest, BuildState, Orchestrator};
use airpack_lib::prereq::Prerequisite;
use airpack_lib::template::launcher::{RUN_SCRIPT, START_SCRIPT};

use crate::output::{
  OutputFormat, Status, format_elapsed, format_size, print_field, print_json, print_stage, print_step, short_checksum,
  status,
};

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
  /// Path to the manifest
  #[arg(short, long, default_value = MANIFEST_FILENAME)]
  pub manifest: PathBuf,

  /// Output directory (default: `dist` next to the manifest)
  #[arg(long)]
  pub output_dir: Option<PathBuf>,

  /// Artifact cache directory
  #[arg(long)]
  pub cache_dir: Option<PathBuf>,

  /// Mirror URL or local directory to fetch the index and artifacts from
  #[arg(long)]
  pub mirror: Option<String>,

  /// Resolve against this index snapshot file instead of the mirror's
  #[arg(long)]
  pub index: Option<PathBuf>,

  /// Empty a non-empty output directory before building
  #[arg(long)]
  pub clean: bool,

  /// Number of concurrent downloads
  #[arg(long)]
  pub workers: Option<usize>,

  /// Network timeout per request (e.g., "30s", "2m")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,

  /// Retries for transient download failures
  #[arg(long)]
  pub retries: Option<u32>,

  /// Archive format: zip or tar.gz
  #[arg(long)]
  pub format: Option<ArchiveFormat>,

  /// Tool that must be present on the build machine, as COMMAND@MIN_VERSION
  #[arg(long, value_name = "COMMAND@MIN")]
  pub require: Option<Prerequisite>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

impl BuildArgs {
  pub fn overrides(&self) -> BuildOverrides {
    BuildOverrides {
      mirror: self.mirror.clone(),
      index: self.index.clone(),
      cache_dir: self.cache_dir.clone(),
      output_dir: self.output_dir.clone(),
      workers: self.workers,
      timeout: self.timeout,
      retries: self.retries,
      format: self.format,
      clean: self.clean,
    }
  }

  pub fn request(&self) -> BuildRequest {
    BuildRequest {
      manifest_path: self.manifest.clone(),
      overrides: self.overrides(),
      prerequisite: self.require.clone(),
    }
  }
}

#[derive(Serialize)]
struct BuildSummary<'a> {
  bundle: &'a str,
  bundle_dir: &'a std::path::Path,
  archive: &'a std::path::Path,
  content_manifest: &'a std::path::Path,
  archive_checksum: &'a str,
  files: usize,
  total_bytes: u64,
  interpreter: String,
  packages: BTreeMap<&'a str, String>,
  states: &'a [BuildState],
  duration_ms: u128,
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let start = Instant::now();
  let json = args.output.is_json();
  debug!(?args, "build arguments");

  let mut orchestrator = Orchestrator::new();
  if !json {
    orchestrator = orchestrator.with_observer(|state| {
      if let BuildState::Running(stage) = state {
        print_stage(stage);
      }
    });
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(orchestrator.build(&args.request()))?;

  if json {
    print_json(&summary(&outcome, start.elapsed()))?;
  } else {
    print_report(&outcome, start.elapsed());
  }

  Ok(())
}

fn summary(outcome: &BuildOutcome, elapsed: Duration) -> BuildSummary<'_> {
  BuildSummary {
    bundle: &outcome.manifest.bundle_name,
    bundle_dir: &outcome.bundle_dir,
    archive: &outcome.archive,
    content_manifest: &outcome.content_manifest,
    archive_checksum: outcome.content.archive.checksum.as_str(),
    files: outcome.content.files.len(),
    total_bytes: outcome.content.total_bytes(),
    interpreter: outcome.graph.interpreter.version.to_string(),
    packages: outcome
      .graph
      .packages
      .iter()
      .map(|(name, package)| (name.as_str(), package.version.to_string()))
      .collect(),
    states: &outcome.states,
    duration_ms: elapsed.as_millis(),
  }
}

fn print_report(outcome: &BuildOutcome, elapsed: Duration) {
  let manifest = &outcome.manifest;
  let keys = &manifest.app.config;
  let archive_name = outcome
    .archive
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();

  println!();
  status(Status::Ok, &format!("Built bundle '{}'", manifest.bundle_name));
  print_field("Bundle", &outcome.bundle_dir.display().to_string());
  print_field("Archive", &outcome.archive.display().to_string());
  print_field("Checksum", &short_checksum(outcome.content.archive.checksum.as_str()));
  print_field("Interpreter", &outcome.graph.interpreter.version.to_string());
  print_field("Packages", &outcome.graph.packages.len().to_string());
  if !outcome.graph.skipped.is_empty() {
    let skipped: Vec<_> = outcome.graph.skipped.iter().map(String::as_str).collect();
    print_field("Skipped", &skipped.join(", "));
  }
  print_field(
    "Files",
    &format!(
      "{} ({})",
      outcome.content.files.len(),
      format_size(outcome.content.total_bytes())
    ),
  );
  print_field("Duration", &format_elapsed(elapsed));

  println!();
  println!("Next steps on the offline machine:");
  print_step(1, &format!("Copy {} over and extract it", archive_name));
  if keys.file.is_empty() {
    print_step(2, "Configure the application as needed");
  } else {
    let named: Vec<&str> = [&keys.api_base, &keys.api_key, &keys.model]
      .into_iter()
      .filter(|k| !k.is_empty())
      .map(String::as_str)
      .collect();
    print_step(
      2,
      &format!(
        "Edit {}/{} and set {}",
        manifest.bundle_name,
        keys.file,
        named.join(", ")
      ),
    );
  }
  print_step(
    3,
    &format!("Run {} (or {} for a console with the bundle on PATH)", RUN_SCRIPT, START_SCRIPT),
  );
}
