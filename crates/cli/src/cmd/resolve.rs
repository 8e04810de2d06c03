//! Implementation of the `airpack resolve` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use airpack_lib::config::BuildOverrides;
use airpack_lib::consts::MANIFEST_FILENAME;
use airpack_lib::pipeline::{BuildRequest, Orchestrator};

use crate::output::{OutputFormat, Status, print_json, short_checksum, status};

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
  /// Path to the manifest
  #[arg(short, long, default_value = MANIFEST_FILENAME)]
  pub manifest: PathBuf,

  /// Mirror URL or local directory to fetch the index from
  #[arg(long)]
  pub mirror: Option<String>,

  /// Resolve against this index snapshot file
  #[arg(long)]
  pub index: Option<PathBuf>,

  /// Artifact cache directory (holds the last fetched index)
  #[arg(long)]
  pub cache_dir: Option<PathBuf>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

/// Execute the resolve command.
///
/// Prints the pinned graph that a build would vendor. Nothing is downloaded
/// beyond the index snapshot and the output directory is not touched.
pub fn cmd_resolve(args: ResolveArgs) -> Result<()> {
  let request = BuildRequest {
    manifest_path: args.manifest,
    overrides: BuildOverrides {
      mirror: args.mirror,
      index: args.index,
      cache_dir: args.cache_dir,
      ..Default::default()
    },
    prerequisite: None,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let resolution = rt.block_on(Orchestrator::new().resolve(&request))?;
  let graph = &resolution.graph;

  if args.output.is_json() {
    return print_json(graph);
  }

  status(Status::Ok, &format!(
    "Resolved {} package(s) for '{}'",
    graph.packages.len(),
    resolution.manifest.bundle_name
  ));
  status(Status::Note, &format!(
    "interpreter {} [{}]",
    graph.interpreter.version,
    short_checksum(&graph.interpreter.checksum)
  ));
  for (name, package) in &graph.packages {
    let deps = if package.dependencies.is_empty() {
      String::new()
    } else {
      format!(
        " -> {}",
        package.dependencies.iter().cloned().collect::<Vec<_>>().join(", ")
      )
    };
    status(Status::Note, &format!(
      "{} {} [{}]{}",
      name,
      package.version,
      short_checksum(&package.checksum),
      deps
    ));
  }
  for name in &graph.skipped {
    status(Status::Warning, &format!("optional package '{}' left out", name));
  }

  Ok(())
}
