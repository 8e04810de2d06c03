//! Implementation of the `airpack cache` commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use airpack_lib::cache::{ArtifactCache, CacheLock, LockMode};
use airpack_lib::platform::paths;

use crate::output::{OutputFormat, Status, format_size, print_field, print_json, status};
use crate::prompts::confirm;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show the cache location and size
  Info {
    /// Cache directory (default: platform cache dir or AIRPACK_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove every cached artifact and index snapshot
  Clear {
    /// Cache directory (default: platform cache dir or AIRPACK_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Skip confirmation prompt
    #[arg(long)]
    force: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

pub fn cmd_cache(command: CacheCommand) -> Result<()> {
  match command {
    CacheCommand::Info { cache_dir, output } => cmd_info(cache_dir, output),
    CacheCommand::Clear {
      cache_dir,
      force,
      output,
    } => cmd_clear(cache_dir, force, output),
  }
}

fn cmd_info(cache_dir: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let cache = ArtifactCache::new(cache_dir.unwrap_or_else(paths::cache_dir));
  let stats = cache.stats().context("Failed to read cache")?;

  if output.is_json() {
    print_json(&serde_json::json!({
      "path": cache.root(),
      "artifacts": stats.artifacts,
      "bytes": stats.bytes,
      "index_cached": cache.index_path().exists(),
    }))?;
  } else {
    status(Status::Note, &format!("Cache at {}", cache.root().display()));
    print_field("Artifacts", &stats.artifacts.to_string());
    print_field("Size", &format_size(stats.bytes));
    print_field(
      "Index snapshot",
      if cache.index_path().exists() { "cached" } else { "none" },
    );
  }
  Ok(())
}

fn cmd_clear(cache_dir: Option<PathBuf>, force: bool, output: OutputFormat) -> Result<()> {
  let cache = ArtifactCache::new(cache_dir.unwrap_or_else(paths::cache_dir));

  if !confirm(&format!("Remove all cached artifacts in {}?", cache.root().display()), force)? {
    status(Status::Note, "Aborted");
    return Ok(());
  }

  let lock = CacheLock::acquire(cache.root(), LockMode::Exclusive, "cache clear").context("Failed to acquire cache lock")?;
  let removed = cache.clear(&lock).context("Failed to clear cache")?;

  if output.is_json() {
    print_json(&removed)?;
  } else {
    status(Status::Ok, "Cache cleared");
    print_field("Artifacts removed", &removed.artifacts.to_string());
    print_field("Space freed", &format_size(removed.bytes));
  }
  Ok(())
}
