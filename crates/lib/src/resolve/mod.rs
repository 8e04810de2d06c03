//! Dependency resolution.
//!
//! Resolution computes the transitive closure of the manifest's requirements
//! against one fixed index snapshot and pins exactly one version per package.
//!
//! The resolver iterates to a fixpoint. Each round recomputes, from scratch,
//! the constraints on every package: the manifest's direct requirements plus
//! the declared dependencies of the versions selected in the previous round
//! that are still reachable from the manifest. Every package then selects the
//! newest release satisfying all of its constraints. The interpreter is
//! handled the same way, constrained by the manifest and by each selected
//! release's `requires_interpreter`.
//!
//! There is no backtracking. When the constraints on a package have no
//! common release, resolution fails and names every requirer, rather than
//! quietly choosing one of them. A failure whose requirers were themselves
//! replaced in the same round is deferred: the next round recomputes the
//! demands from the new selection.
//!
//! Optional manifest packages are tried one at a time, in declaration order,
//! on top of the required set. One that cannot be resolved is left out and
//! recorded in [`ResolvedGraph::skipped`].

mod graph;
mod snapshot;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;

use semver::Version;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::index::{IndexError, InterpreterRelease, PackageIndex, Release};
use crate::manifest::{Manifest, normalize_name};
use crate::version::Constraint;

pub use graph::{ResolvedArtifact, ResolvedGraph, ResolvedPackage};
pub use snapshot::load_index;

/// Upper bound on resolution rounds before giving up.
pub const MAX_ROUNDS: usize = 64;

/// Name used for the interpreter in resolution errors.
pub const INTERPRETER: &str = "interpreter";

/// Who imposed a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirer {
  Manifest,
  Package { name: String, version: Version },
}

impl fmt::Display for Requirer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Requirer::Manifest => write!(f, "manifest"),
      Requirer::Package { name, version } => write!(f, "{} {}", name, version),
    }
  }
}

/// One constraint and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demand {
  pub requirer: Requirer,
  pub constraint: Constraint,
}

fn describe(demands: &[Demand]) -> String {
  demands
    .iter()
    .map(|d| format!("\n  {} requires {}", d.requirer, d.constraint))
    .collect()
}

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("cannot resolve {package}: no release satisfies all requirements:{}", describe(.demands))]
  Unresolvable { package: String, demands: Vec<Demand> },

  #[error("unknown package '{package}' (required by {required_by})")]
  UnknownPackage { package: String, required_by: Requirer },

  #[error("resolution did not settle after {0} rounds")]
  NoConvergence(usize),

  #[error("dependency cycle involving '{package}'")]
  Cycle { package: String },

  #[error("'{package}' depends on '{dependency}', which is not in the resolved graph")]
  IncompleteClosure { package: String, dependency: String },

  #[error("package index unavailable from {source_desc}: {reason}")]
  NetworkUnavailable { source_desc: String, reason: String },

  #[error("failed to read index snapshot {}: {source}", path.display())]
  IndexFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Index(#[from] IndexError),
}

/// Resolve a manifest against an index snapshot.
pub fn resolve(manifest: &Manifest, index: &PackageIndex) -> Result<ResolvedGraph, ResolveError> {
  resolve_without(manifest, index, &BTreeSet::new())
}

/// Resolve with the optional packages named in `excluded` left out up front.
///
/// Excluded names are normalized and reported as skipped. Required packages
/// are never excluded.
pub fn resolve_without(
  manifest: &Manifest,
  index: &PackageIndex,
  excluded: &BTreeSet<String>,
) -> Result<ResolvedGraph, ResolveError> {
  let excluded: BTreeSet<String> = excluded.iter().map(|n| normalize_name(n)).collect();
  let mut roots: Vec<(String, Constraint)> = manifest
    .packages
    .iter()
    .filter(|r| !r.optional)
    .map(|r| (normalize_name(&r.name), r.constraint.clone()))
    .collect();

  let mut graph = build_graph(&settle(manifest, &roots, index)?)?;
  let mut skipped = BTreeSet::new();
  for optional in manifest.packages.iter().filter(|r| r.optional) {
    let name = normalize_name(&optional.name);
    if excluded.contains(&name) {
      debug!(package = %optional.name, "optional package excluded");
      skipped.insert(optional.name.clone());
      continue;
    }
    roots.push((name, optional.constraint.clone()));
    match settle(manifest, &roots, index).and_then(|s| build_graph(&s)) {
      Ok(with_optional) => graph = with_optional,
      Err(e) => {
        warn!(package = %optional.name, error = %e, "skipping optional package");
        roots.pop();
        skipped.insert(optional.name.clone());
      }
    }
  }
  graph.skipped = skipped;

  info!(
    interpreter = %graph.interpreter.version,
    packages = graph.packages.len(),
    skipped = graph.skipped.len(),
    "resolved dependency graph"
  );
  Ok(graph)
}

/// Iterate rounds until the selection stops changing.
fn settle<'a>(
  manifest: &Manifest,
  roots: &[(String, Constraint)],
  index: &'a PackageIndex,
) -> Result<Selection<'a>, ResolveError> {
  let mut selection = Selection::default();
  for round in 1..=MAX_ROUNDS {
    let next = select(manifest, roots, index, &selection)?;
    if next.fingerprint() == selection.fingerprint() {
      debug!(rounds = round, packages = next.packages.len(), "resolution settled");
      return Ok(next);
    }
    selection = next;
  }
  Err(ResolveError::NoConvergence(MAX_ROUNDS))
}

#[derive(Default)]
struct Selection<'a> {
  interpreter: Option<&'a InterpreterRelease>,
  /// Keyed by normalized name.
  packages: BTreeMap<String, &'a Release>,
}

impl Selection<'_> {
  fn fingerprint(&self) -> (Option<&Version>, Vec<(&str, &Version)>) {
    (
      self.interpreter.map(|i| &i.version),
      self.packages.iter().map(|(n, r)| (n.as_str(), &r.version)).collect(),
    )
  }
}

/// One round: gather constraints implied by `current`, then pick versions.
fn select<'a>(
  manifest: &Manifest,
  roots: &[(String, Constraint)],
  index: &'a PackageIndex,
  current: &Selection<'a>,
) -> Result<Selection<'a>, ResolveError> {
  let mut demands: BTreeMap<String, Vec<Demand>> = BTreeMap::new();
  let mut interpreter_demands = vec![Demand {
    requirer: Requirer::Manifest,
    constraint: manifest.interpreter.version.clone(),
  }];

  for (name, constraint) in roots {
    demands.entry(name.clone()).or_default().push(Demand {
      requirer: Requirer::Manifest,
      constraint: constraint.clone(),
    });
  }

  // Only releases still reachable from the manifest contribute constraints.
  let mut queue: VecDeque<&str> = roots.iter().map(|(n, _)| n.as_str()).collect();
  let mut visited = BTreeSet::new();
  while let Some(name) = queue.pop_front() {
    if !visited.insert(name) {
      continue;
    }
    let Some(release) = current.packages.get(name) else {
      continue;
    };
    let requirer = Requirer::Package {
      name: release.name.clone(),
      version: release.version.clone(),
    };
    for (dep, constraint) in &release.dependencies {
      demands.entry(dep.clone()).or_default().push(Demand {
        requirer: requirer.clone(),
        constraint: constraint.clone(),
      });
      queue.push_back(dep.as_str());
    }
    if let Some(constraint) = &release.requires_interpreter {
      interpreter_demands.push(Demand {
        requirer: requirer.clone(),
        constraint: constraint.clone(),
      });
    }
  }

  let mut packages = BTreeMap::new();
  let mut failures = Vec::new();
  for (name, package_demands) in demands {
    let Some(releases) = index.releases(&name) else {
      failures.push(ResolveError::UnknownPackage {
        package: display_name(manifest, &name, &package_demands),
        required_by: package_demands[0].requirer.clone(),
      });
      continue;
    };
    match releases
      .iter()
      .find(|r| package_demands.iter().all(|d| d.constraint.matches(&r.version)))
    {
      Some(release) => {
        packages.insert(name, release);
      }
      None => failures.push(ResolveError::Unresolvable {
        package: releases.first().map(|r| r.name.clone()).unwrap_or_else(|| name.clone()),
        demands: package_demands,
      }),
    }
  }

  let interpreter = index
    .interpreters()
    .iter()
    .find(|i| interpreter_demands.iter().all(|d| d.constraint.matches(&i.version)));
  if interpreter.is_none() {
    failures.push(ResolveError::Unresolvable {
      package: INTERPRETER.to_string(),
      demands: interpreter_demands,
    });
  }

  // A failure only counts once every package requirer behind it is still
  // selected at the same version. Otherwise its demands are stale and the
  // next round recomputes them.
  for failure in failures {
    if stale(&failure, &packages) {
      debug!(error = %failure, "deferring failure from a superseded selection");
      continue;
    }
    return Err(failure);
  }

  Ok(Selection { interpreter, packages })
}

fn stale(failure: &ResolveError, picked: &BTreeMap<String, &Release>) -> bool {
  let superseded = |requirer: &Requirer| match requirer {
    Requirer::Manifest => false,
    Requirer::Package { name, version } => {
      picked.get(&normalize_name(name)).map(|r| &r.version) != Some(version)
    }
  };
  match failure {
    ResolveError::Unresolvable { demands, .. } => demands.iter().any(|d| superseded(&d.requirer)),
    ResolveError::UnknownPackage { required_by, .. } => superseded(required_by),
    _ => false,
  }
}

/// Prefer the manifest's spelling when reporting an unknown package.
fn display_name(manifest: &Manifest, normalized: &str, demands: &[Demand]) -> String {
  if demands.iter().any(|d| d.requirer == Requirer::Manifest)
    && let Some(req) = manifest.packages.iter().find(|r| normalize_name(&r.name) == normalized)
  {
    return req.name.clone();
  }
  normalized.to_string()
}

fn build_graph(selection: &Selection<'_>) -> Result<ResolvedGraph, ResolveError> {
  let interpreter = selection.interpreter.ok_or_else(|| ResolveError::Unresolvable {
    package: INTERPRETER.to_string(),
    demands: Vec::new(),
  })?;

  let packages: BTreeMap<String, ResolvedPackage> = selection
    .packages
    .values()
    .map(|release| {
      let dependencies = release
        .dependencies
        .keys()
        .filter_map(|dep| selection.packages.get(dep).map(|r| r.name.clone()))
        .collect();
      (
        release.name.clone(),
        ResolvedPackage {
          version: release.version.clone(),
          source: release.url.clone(),
          checksum: release.checksum.clone(),
          dependencies,
        },
      )
    })
    .collect();

  let graph = ResolvedGraph {
    interpreter: ResolvedArtifact {
      version: interpreter.version.clone(),
      source: interpreter.url.clone(),
      checksum: interpreter.checksum.clone(),
    },
    packages,
    skipped: BTreeSet::new(),
  };
  graph.validate()?;
  Ok(graph)
}
