//! Version and constraint parsing.
//!
//! Versions are dotted numerics (`3.11`, `1.5.0`) normalized onto
//! [`semver::Version`] by zero-padding to three components. Constraints are
//! comma-separated comparators in the familiar package-index style and are
//! translated into a [`semver::VersionReq`]:
//!
//! | written   | meaning                                  |
//! |-----------|------------------------------------------|
//! | `==1.5`   | exactly `1.5.0`                          |
//! | `>=1.0`   | `1.0.0` or newer (also `>`, `<`, `<=`)   |
//! | `~=1.4`   | `>=1.4.0, <2.0.0` (compatible release)   |
//! | `~=1.4.2` | `>=1.4.2, <1.5.0`                        |
//! | `^1.2`    | caret, as in Cargo                       |
//! | `3.11`    | any `3.11.x` (prefix match)              |
//! | `*`       | anything                                 |

use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing versions or constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
  #[error("invalid version '{0}'")]
  InvalidVersion(String),

  #[error("invalid constraint '{constraint}': {reason}")]
  InvalidConstraint { constraint: String, reason: String },

  #[error("unsupported operator '{operator}' in constraint '{constraint}'")]
  UnsupportedOperator { constraint: String, operator: String },
}

/// Parse a dotted numeric version, zero-padding to three components.
pub fn parse_version(s: &str) -> Result<Version, VersionError> {
  let parts = numeric_parts(s).ok_or_else(|| VersionError::InvalidVersion(s.to_string()))?;
  Ok(pad(&parts))
}

/// Find the first dotted version number in free-form text.
///
/// Used for `--version` output such as `Python 3.11.4`. Components beyond the
/// third are ignored.
pub fn extract_version(text: &str) -> Option<Version> {
  text.split_whitespace().find_map(|token| {
    let numeric: String = token
      .trim_start_matches('v')
      .chars()
      .take_while(|c| c.is_ascii_digit() || *c == '.')
      .collect();
    let numeric = numeric.trim_end_matches('.');
    if !numeric.contains('.') {
      return None;
    }
    let parts: Vec<u64> = numeric.split('.').map(str::parse).collect::<Result<_, _>>().ok()?;
    Some(pad(&parts[..parts.len().min(3)]))
  })
}

fn numeric_parts(s: &str) -> Option<Vec<u64>> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }
  let parts: Vec<u64> = s
    .split('.')
    .map(|p| {
      if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
        None
      } else {
        p.parse().ok()
      }
    })
    .collect::<Option<_>>()?;
  if parts.len() > 3 { None } else { Some(parts) }
}

fn pad(parts: &[u64]) -> Version {
  Version::new(
    parts.first().copied().unwrap_or(0),
    parts.get(1).copied().unwrap_or(0),
    parts.get(2).copied().unwrap_or(0),
  )
}

/// A version constraint, keeping the text it was written as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
  raw: String,
  req: VersionReq,
}

impl Constraint {
  /// A constraint that accepts every version.
  pub fn any() -> Self {
    Self {
      raw: "*".to_string(),
      req: VersionReq::STAR,
    }
  }

  pub fn parse(s: &str) -> Result<Self, VersionError> {
    let raw = s.trim().to_string();
    let invalid = |reason: &str| VersionError::InvalidConstraint {
      constraint: raw.clone(),
      reason: reason.to_string(),
    };

    if raw.is_empty() {
      return Err(invalid("empty constraint"));
    }

    let mut comparators = Vec::new();
    for part in raw.split(',').map(str::trim) {
      if part.is_empty() {
        return Err(invalid("empty comparator"));
      }
      if part == "*" {
        continue;
      }
      comparators.extend(translate(&raw, part)?);
    }

    let req = if comparators.is_empty() {
      VersionReq::STAR
    } else {
      VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(&e.to_string()))?
    };

    Ok(Self { raw, req })
  }

  pub fn matches(&self, version: &Version) -> bool {
    self.req.matches(version)
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }
}

/// Translate one written comparator into semver comparator strings.
fn translate(raw: &str, part: &str) -> Result<Vec<String>, VersionError> {
  const OPERATORS: [&str; 9] = ["==", ">=", "<=", "~=", "!=", ">", "<", "^", "="];

  let (op, rest) = OPERATORS
    .iter()
    .find_map(|op| part.strip_prefix(op).map(|rest| (*op, rest.trim())))
    .unwrap_or(("", part));

  let parts = numeric_parts(rest).ok_or_else(|| VersionError::InvalidConstraint {
    constraint: raw.to_string(),
    reason: format!("'{}' is not a dotted numeric version", rest),
  })?;
  let full = pad(&parts);
  let written = parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".");

  let out = match op {
    "==" => vec![format!("={}", full)],
    ">=" | "<=" | ">" | "<" => vec![format!("{}{}", op, full)],
    "^" => vec![format!("^{}", written)],
    "" | "=" => vec![format!("={}", written)],
    "~=" => {
      if parts.len() < 2 {
        return Err(VersionError::InvalidConstraint {
          constraint: raw.to_string(),
          reason: "'~=' needs at least two version components".to_string(),
        });
      }
      let upper = if parts.len() == 2 {
        Version::new(full.major + 1, 0, 0)
      } else {
        Version::new(full.major, full.minor + 1, 0)
      };
      vec![format!(">={}", full), format!("<{}", upper)]
    }
    other => {
      return Err(VersionError::UnsupportedOperator {
        constraint: raw.to_string(),
        operator: other.to_string(),
      });
    }
  };
  Ok(out)
}

impl fmt::Display for Constraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.raw)
  }
}

impl FromStr for Constraint {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl Serialize for Constraint {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.raw)
  }
}

impl<'de> Deserialize<'de> for Constraint {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Self::parse(&raw).map_err(serde::de::Error::custom)
  }
}
