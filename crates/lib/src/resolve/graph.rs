//! The resolved dependency graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::ResolveError;

/// A pinned artifact: exact version, where it comes from, what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
  pub version: Version,
  /// Index URL (absolute, or relative to the mirror).
  pub source: String,
  pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPackage {
  pub version: Version,
  pub source: String,
  pub checksum: String,
  /// Names of the packages this one depends on, all present in the graph.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub dependencies: BTreeSet<String>,
}

/// Exactly one pinned version per package, plus the interpreter runtime.
///
/// Maps are ordered by name, so the serialized form is canonical: the same
/// resolution always produces the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGraph {
  pub interpreter: ResolvedArtifact,
  pub packages: BTreeMap<String, ResolvedPackage>,
  /// Optional manifest packages left out of this resolution.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub skipped: BTreeSet<String>,
}

impl ResolvedGraph {
  /// Canonical pretty JSON, newline terminated.
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(self)?;
    json.push('\n');
    Ok(json)
  }

  /// Check closure completeness and acyclicity.
  pub fn validate(&self) -> Result<(), ResolveError> {
    for (name, package) in &self.packages {
      if let Some(missing) = package.dependencies.iter().find(|d| !self.packages.contains_key(*d)) {
        return Err(ResolveError::IncompleteClosure {
          package: name.clone(),
          dependency: missing.clone(),
        });
      }
    }
    self.install_order().map(|_| ())
  }

  /// Package names with every dependency before its dependents.
  pub fn install_order(&self) -> Result<Vec<&str>, ResolveError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = self
      .packages
      .keys()
      .map(|name| (name.as_str(), graph.add_node(name.as_str())))
      .collect();

    for (name, package) in &self.packages {
      for dep in &package.dependencies {
        if let Some(&dep_idx) = nodes.get(dep.as_str()) {
          graph.add_edge(dep_idx, nodes[name.as_str()], ());
        }
      }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| ResolveError::Cycle {
      package: graph[cycle.node_id()].to_string(),
    })?;
    Ok(sorted.into_iter().map(|idx| graph[idx]).collect())
  }
}
