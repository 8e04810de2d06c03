//! Implementation of the `airpack verify` command.

use std::path::Path;

use anyhow::{Result, bail};

use airpack_lib::package::verify;

use crate::output::{OutputFormat, Status, print_field, print_json, status};

/// Execute the verify command.
///
/// Fails when the archive or any entry differs from the content manifest.
pub fn cmd_verify(manifest: &Path, output: OutputFormat) -> Result<()> {
  let report = verify(manifest)?;
  let problems: Vec<String> = report.problems.iter().map(ToString::to_string).collect();

  if output.is_json() {
    print_json(&serde_json::json!({
      "archive": report.archive,
      "bundle": report.manifest.bundle,
      "files_checked": report.files_checked,
      "directories_checked": report.directories_checked,
      "ok": report.is_ok(),
      "problems": problems,
    }))?;
  } else if report.is_ok() {
    status(Status::Ok, &format!("{} matches its manifest", report.archive.display()));
    print_field("Files checked", &report.files_checked.to_string());
    print_field("Directories checked", &report.directories_checked.to_string());
  } else {
    for problem in &problems {
      status(Status::Warning, problem);
    }
  }

  if !report.is_ok() {
    bail!(
      "{} does not match {} ({} problem(s))",
      report.archive.display(),
      manifest.display(),
      problems.len()
    );
  }
  Ok(())
}
