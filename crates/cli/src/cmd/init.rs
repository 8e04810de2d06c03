//! Implementation of the `airpack init` command.

use std::path::Path;

use anyhow::{Context, Result};

use airpack_lib::init::{InitOptions, init};

use crate::output::{Status, print_field, print_step, status};

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the manifest or entry point already exist.
pub fn cmd_init(dir: &Path, name: Option<String>) -> Result<()> {
  let options = InitOptions {
    project_dir: dir.to_path_buf(),
    bundle_name: name,
  };

  let result = init(&options).context("Failed to initialize project")?;

  status(Status::Ok, &format!("Initialized bundle project '{}'", result.bundle_name));
  print_field("Project", &result.project_dir.display().to_string());
  print_field("Manifest", &result.manifest.display().to_string());
  print_field("Entry point", &result.entry.display().to_string());

  println!();
  println!("Next steps:");
  print_step(1, "Add [[package]] entries for the application's dependencies");
  print_step(2, "Point [build] mirror at the package mirror");
  print_step(3, "Run 'airpack build'");

  Ok(())
}
