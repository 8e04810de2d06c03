//! Build prerequisite checks.
//!
//! A prerequisite is an external tool that must be installed at some
//! minimum version before a build may start. Probing yields a
//! [`Capability`]; each way of falling short maps to its own error.

use std::fmt;
use std::process::Command;
use std::str::FromStr;

use semver::Version;
use thiserror::Error;
use tracing::{debug, info};

use crate::version::{extract_version, parse_version};

#[derive(Debug, Error)]
pub enum PrerequisiteError {
  #[error("required tool '{command}' was not found")]
  Missing { command: String },

  #[error("'{command}' {found} is too old (need at least {minimum})")]
  TooOld {
    command: String,
    found: Version,
    minimum: Version,
  },

  #[error("could not determine the version of '{command}' from: {output}")]
  Unrecognized { command: String, output: String },

  #[error("invalid prerequisite '{0}' (expected COMMAND@MIN_VERSION)")]
  InvalidSpec(String),
}

/// What detection found out about a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
  Present(Version),
  Absent,
  /// Runs, but its version output could not be understood.
  Unknown(String),
}

/// Finds out whether a tool is installed and at which version.
pub trait RuntimeDetector {
  fn detect(&self, command: &str) -> Capability;
}

/// Detects by running `<command> --version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDetector;

impl RuntimeDetector for CommandDetector {
  fn detect(&self, command: &str) -> Capability {
    match Command::new(command).arg("--version").output() {
      Ok(output) => {
        // Some tools print their version on stderr.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(command, output = %text.trim(), "detected prerequisite");
        match extract_version(&text) {
          Some(version) => Capability::Present(version),
          None => Capability::Unknown(text.trim().to_string()),
        }
      }
      Err(e) => {
        debug!(command, error = %e, "prerequisite not runnable");
        Capability::Absent
      }
    }
  }
}

/// A required tool and its minimum version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisite {
  pub command: String,
  pub minimum: Version,
}

impl FromStr for Prerequisite {
  type Err = PrerequisiteError;

  /// Parse `COMMAND@MIN_VERSION`, e.g. `python@3.8`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || PrerequisiteError::InvalidSpec(s.to_string());
    let (command, minimum) = s.rsplit_once('@').ok_or_else(invalid)?;
    if command.trim().is_empty() {
      return Err(invalid());
    }
    Ok(Self {
      command: command.trim().to_string(),
      minimum: parse_version(minimum).map_err(|_| invalid())?,
    })
  }
}

impl fmt::Display for Prerequisite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.command, self.minimum)
  }
}

impl Prerequisite {
  /// Check the prerequisite, returning the version found.
  pub fn check(&self, detector: &dyn RuntimeDetector) -> Result<Version, PrerequisiteError> {
    match detector.detect(&self.command) {
      Capability::Present(found) if found >= self.minimum => {
        info!(command = %self.command, version = %found, "prerequisite satisfied");
        Ok(found)
      }
      Capability::Present(found) => Err(PrerequisiteError::TooOld {
        command: self.command.clone(),
        found,
        minimum: self.minimum.clone(),
      }),
      Capability::Absent => Err(PrerequisiteError::Missing {
        command: self.command.clone(),
      }),
      Capability::Unknown(output) => Err(PrerequisiteError::Unrecognized {
        command: self.command.clone(),
        output,
      }),
    }
  }
}
