//! Console rendering for airpack commands.
//!
//! Every status line goes through [`Status`], which fixes its marker, colour
//! and stream. Progress and problems go to stderr so that `-o json` output on
//! stdout stays parseable.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use airpack_lib::pipeline::Stage;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Kind of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Ok,
  Failed,
  Warning,
  Note,
}

impl Status {
  pub fn marker(self) -> &'static str {
    match self {
      Status::Ok => "✓",
      Status::Failed => "✗",
      Status::Warning => "⚠",
      Status::Note => "•",
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Status::Failed | Status::Warning)
  }
}

/// Print `message` behind the marker for `kind`.
pub fn status(kind: Status, message: &str) {
  let stream = || if kind.to_stderr() { Stream::Stderr } else { Stream::Stdout };
  let marker = kind.marker();
  let line = match kind {
    Status::Ok => format!("{} {}", marker.if_supports_color(stream(), |s| s.green()), message),
    Status::Note => format!("{} {}", marker.if_supports_color(stream(), |s| s.blue()), message),
    Status::Failed => format!(
      "{} {}",
      marker.if_supports_color(stream(), |s| s.red()),
      message.if_supports_color(stream(), |s| s.red())
    ),
    Status::Warning => format!(
      "{} {}",
      marker.if_supports_color(stream(), |s| s.yellow()),
      message.if_supports_color(stream(), |s| s.yellow())
    ),
  };
  if kind.to_stderr() {
    eprintln!("{}", line);
  } else {
    println!("{}", line);
  }
}

/// `[3/6] vendoring`
pub fn stage_line(stage: Stage) -> String {
  let position = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0) + 1;
  format!("[{}/{}] {}", position, Stage::ALL.len(), stage)
}

/// Announce a pipeline stage on stderr.
pub fn print_stage(stage: Stage) {
  eprintln!("{}", stage_line(stage).if_supports_color(Stream::Stderr, |s| s.cyan()));
}

/// Checksums are shown as `sha256:` and the first 12 hex digits.
pub fn short_checksum(checksum: &str) -> String {
  let digits = checksum.get(..12).unwrap_or(checksum);
  format!("sha256:{}", digits)
}

/// Artifact and bundle sizes in binary units.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Build time, to the millisecond, in humantime notation.
pub fn format_elapsed(elapsed: Duration) -> String {
  let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

/// Indented `label: value` line under a status message.
pub fn print_field(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Numbered instruction line.
pub fn print_step(number: usize, message: &str) {
  println!(
    "  {} {}",
    format!("{}.", number).if_supports_color(Stream::Stdout, |s| s.bold()),
    message
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
