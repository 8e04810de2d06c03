//! Windows launcher scripts.
//!
//! Every path is built from `%~dp0`, the directory the script lives in, so
//! the bundle runs from wherever it is extracted.

use crate::manifest::Manifest;
use crate::stage::{APP_DIR, RUNTIME_DIR, VENDOR_DIR};

pub const RUN_SCRIPT: &str = "run.bat";
pub const START_SCRIPT: &str = "start.bat";

fn crlf(lines: &[String]) -> String {
  let mut out = lines.join("\r\n");
  out.push_str("\r\n");
  out
}

fn windows_path(portable: &str) -> String {
  portable.replace('/', "\\")
}

/// `set` line for the import path: the app first, then each package.
fn path_var_line<'a>(manifest: &Manifest, packages: impl Iterator<Item = &'a str>) -> String {
  let mut entries = vec![format!("%BUNDLE%{}", APP_DIR)];
  entries.extend(packages.map(|name| format!("%BUNDLE%{}\\{}", VENDOR_DIR, name)));
  format!("set \"{}={}\"", manifest.interpreter.path_var, entries.join(";"))
}

/// Runs the application entry point with the bundled runtime.
pub fn run_script<'a>(manifest: &Manifest, packages: impl Iterator<Item = &'a str>) -> String {
  let entry = manifest.app.entry.to_string_lossy();
  crlf(&[
    "@echo off".to_string(),
    "setlocal".to_string(),
    "set \"BUNDLE=%~dp0\"".to_string(),
    path_var_line(manifest, packages),
    format!(
      "\"%BUNDLE%{}\\{}\" \"%BUNDLE%{}\\{}\" %*",
      RUNTIME_DIR,
      windows_path(&manifest.interpreter.executable),
      APP_DIR,
      windows_path(&entry)
    ),
    "exit /b %ERRORLEVEL%".to_string(),
  ])
}

/// Opens a console with the bundled runtime first on `PATH`.
pub fn start_script<'a>(manifest: &Manifest, packages: impl Iterator<Item = &'a str>) -> String {
  crlf(&[
    "@echo off".to_string(),
    "set \"BUNDLE=%~dp0\"".to_string(),
    format!("set \"PATH=%BUNDLE%{0};%BUNDLE%{0}\\Scripts;%PATH%\"", RUNTIME_DIR),
    path_var_line(manifest, packages),
    "cd /d \"%BUNDLE%\"".to_string(),
    format!("echo {} offline bundle. Run {} to start the application.", manifest.bundle_name, RUN_SCRIPT),
    "cmd /k".to_string(),
  ])
}
