//! Build orchestration.
//!
//! Runs the build stages in order, driving the [`StateMachine`]: the
//! prerequisite check, resolving (manifest, configuration, index snapshot,
//! dependency graph), vendoring, staging, templating and packaging. The
//! first failing stage aborts the build, and the error names that stage.

mod state;

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::{ArtifactCache, CacheLock, CacheLockError, LockMode};
use crate::config::{BuildConfig, BuildOverrides, ConfigError};
use crate::fetch::{Downloader, FetchError};
use crate::index::PackageIndex;
use crate::manifest::{Manifest, ManifestError, normalize_name};
use crate::package::{ContentManifest, PackageError, package};
use crate::prereq::{CommandDetector, Prerequisite, PrerequisiteError, RuntimeDetector};
use crate::resolve::{ResolveError, ResolvedGraph, load_index, resolve, resolve_without};
use crate::stage::{OutputDir, StageError, assemble, validate_app};
use crate::template::{TemplateError, write_bundle_files};
use crate::vendor::{Fetcher, VendorError};

pub use state::{BuildState, Stage, StateMachine, TransitionError};

/// Exit status for a missing or outdated prerequisite.
pub const EXIT_PREREQUISITE: i32 = 1;
/// Exit status for any other build failure.
pub const EXIT_PIPELINE: i32 = 2;

/// The underlying cause of a build failure.
#[derive(Debug, Error)]
pub enum FailureKind {
  #[error(transparent)]
  Prerequisite(#[from] PrerequisiteError),
  #[error(transparent)]
  Manifest(#[from] ManifestError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  CacheLock(#[from] CacheLockError),
  #[error(transparent)]
  Fetch(#[from] FetchError),
  #[error(transparent)]
  Resolve(#[from] ResolveError),
  #[error(transparent)]
  Vendor(#[from] VendorError),
  #[error(transparent)]
  Stage(#[from] StageError),
  #[error(transparent)]
  Template(#[from] TemplateError),
  #[error(transparent)]
  Package(#[from] PackageError),
  #[error(transparent)]
  Transition(#[from] TransitionError),
}

/// A build failure and the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed: {kind}")]
pub struct BuildError {
  pub stage: Stage,
  #[source]
  pub kind: FailureKind,
}

impl BuildError {
  pub fn new(stage: Stage, kind: impl Into<FailureKind>) -> Self {
    Self {
      stage,
      kind: kind.into(),
    }
  }

  /// Process exit status for this failure.
  pub fn exit_code(&self) -> i32 {
    match self.kind {
      FailureKind::Prerequisite(_) => EXIT_PREREQUISITE,
      _ => EXIT_PIPELINE,
    }
  }
}

/// Everything one build needs from its caller.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub manifest_path: PathBuf,
  pub overrides: BuildOverrides,
  pub prerequisite: Option<Prerequisite>,
}

impl BuildRequest {
  pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
    Self {
      manifest_path: manifest_path.into(),
      overrides: BuildOverrides::default(),
      prerequisite: None,
    }
  }
}

/// The outputs of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
  pub manifest: Manifest,
  pub bundle_dir: PathBuf,
  pub archive: PathBuf,
  pub content_manifest: PathBuf,
  pub content: ContentManifest,
  pub graph: ResolvedGraph,
  /// Every state the build passed through.
  pub states: Vec<BuildState>,
}

/// Result of the resolving stage on its own.
#[derive(Debug, Clone)]
pub struct Resolution {
  pub manifest: Manifest,
  pub config: BuildConfig,
  pub graph: ResolvedGraph,
}

type Observer = Box<dyn Fn(BuildState)>;

/// Runs builds.
pub struct Orchestrator {
  detector: Box<dyn RuntimeDetector>,
  observer: Option<Observer>,
}

impl Default for Orchestrator {
  fn default() -> Self {
    Self::new()
  }
}

impl Orchestrator {
  pub fn new() -> Self {
    Self {
      detector: Box::new(CommandDetector),
      observer: None,
    }
  }

  pub fn with_detector(mut self, detector: impl RuntimeDetector + 'static) -> Self {
    self.detector = Box::new(detector);
    self
  }

  /// Call `observer` on every state transition.
  pub fn with_observer(mut self, observer: impl Fn(BuildState) + 'static) -> Self {
    self.observer = Some(Box::new(observer));
    self
  }

  /// Run a complete build.
  #[instrument(skip_all, fields(manifest = %request.manifest_path.display()))]
  pub async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
    let mut machine = StateMachine::new();
    match self.run(request, &mut machine).await {
      Ok(mut outcome) => {
        outcome.states = machine.history().to_vec();
        Ok(outcome)
      }
      Err(err) => {
        if let Ok(state) = machine.fail() {
          self.notify(state);
        }
        warn!(stage = %err.stage, error = %err.kind, "build failed");
        Err(err)
      }
    }
  }

  /// Run only as far as resolving, without touching the output directory.
  pub async fn resolve(&self, request: &BuildRequest) -> Result<Resolution, BuildError> {
    let (resolution, _index, _lock) = self.resolve_stage(request).await?;
    Ok(resolution)
  }

  async fn run(&self, request: &BuildRequest, machine: &mut StateMachine) -> Result<BuildOutcome, BuildError> {
    let stage = self.advance(machine)?;
    match request.prerequisite.clone().or_else(|| manifest_prerequisite(request)) {
      Some(prerequisite) => {
        prerequisite
          .check(self.detector.as_ref())
          .map_err(|e| BuildError::new(stage, e))?;
      }
      None => info!("no prerequisite configured"),
    }

    self.advance(machine)?;
    // The shared lock keeps `cache clear` away until the build finishes.
    let (Resolution { manifest, config, mut graph }, index, _cache_lock) = self.resolve_stage(request).await?;

    let stage = self.advance(machine)?;
    let downloader = Downloader::new(config.timeout, config.retries).map_err(|e| BuildError::new(stage, e))?;
    let fetcher = Fetcher::new(
      ArtifactCache::new(&config.cache_dir),
      downloader,
      config.mirror.clone(),
      config.workers,
    );
    // An optional package the mirror cannot serve is dropped and the graph
    // resolved again without it.
    let mut excluded = graph.skipped.clone();
    let vendored = loop {
      match fetcher.vendor(&graph).await {
        Ok(vendored) => break vendored,
        Err(e @ VendorError::Fetch { .. }) if is_optional(&manifest, e.package()) => {
          warn!(package = e.package(), error = %e, "optional package unavailable, leaving it out");
          excluded.insert(e.package().to_string());
          graph = resolve_without(&manifest, &index, &excluded).map_err(|e| BuildError::new(stage, e))?;
        }
        Err(e) => return Err(BuildError::new(stage, e)),
      }
    };

    let stage = self.advance(machine)?;
    validate_app(&manifest.app).map_err(|e| BuildError::new(stage, e))?;
    let mut output = OutputDir::prepare_for(&config.output_dir, config.clean, &manifest.root)
      .map_err(|e| BuildError::new(stage, e))?;
    let tree = assemble(&manifest, &vendored, &mut output).map_err(|e| BuildError::new(stage, e))?;

    let stage = self.advance(machine)?;
    write_bundle_files(&tree, &manifest, &graph).map_err(|e| BuildError::new(stage, e))?;

    let stage = self.advance(machine)?;
    let packaged =
      package(&tree, &manifest.bundle_name, config.format, &mut output).map_err(|e| BuildError::new(stage, e))?;
    output.disarm();

    self.advance(machine)?;
    info!(archive = %packaged.archive.display(), "build complete");

    Ok(BuildOutcome {
      manifest,
      bundle_dir: packaged.bundle_dir,
      archive: packaged.archive,
      content_manifest: packaged.manifest_path,
      content: packaged.content,
      graph,
      states: Vec::new(),
    })
  }

  async fn resolve_stage(
    &self,
    request: &BuildRequest,
  ) -> Result<(Resolution, PackageIndex, CacheLock), BuildError> {
    let err = |e: FailureKind| BuildError {
      stage: Stage::Resolving,
      kind: e,
    };

    let manifest = Manifest::load(&request.manifest_path).map_err(|e| err(e.into()))?;
    let config = BuildConfig::resolve(&manifest, &request.overrides).map_err(|e| err(e.into()))?;
    let lock = CacheLock::acquire(&config.cache_dir, LockMode::Shared, "build").map_err(|e| err(e.into()))?;
    let cache = ArtifactCache::new(&config.cache_dir);
    let downloader = Downloader::new(config.timeout, config.retries).map_err(|e| err(e.into()))?;

    let index = load_index(&config, &cache, &downloader).await.map_err(|e| err(e.into()))?;
    let graph = resolve(&manifest, &index).map_err(|e| err(e.into()))?;

    Ok((Resolution { manifest, config, graph }, index, lock))
  }

  /// Advance the machine, returning the stage now running.
  fn advance(&self, machine: &mut StateMachine) -> Result<Stage, BuildError> {
    let previous = match machine.state() {
      BuildState::Running(stage) => stage,
      _ => Stage::PrereqCheck,
    };
    let state = machine.advance().map_err(|e| BuildError::new(previous, e))?;
    self.notify(state);
    Ok(match state {
      BuildState::Running(stage) => stage,
      _ => previous,
    })
  }

  fn notify(&self, state: BuildState) {
    if let Some(observer) = &self.observer {
      observer(state);
    }
  }
}

fn is_optional(manifest: &Manifest, package: &str) -> bool {
  let package = normalize_name(package);
  manifest
    .packages
    .iter()
    .any(|r| r.optional && normalize_name(&r.name) == package)
}

/// `[build] require` from the manifest. A manifest that cannot be read is
/// left for the resolving stage to report.
fn manifest_prerequisite(request: &BuildRequest) -> Option<Prerequisite> {
  match Manifest::load(&request.manifest_path) {
    Ok(manifest) => manifest.prerequisite,
    Err(e) => {
      debug!(error = %e, "manifest unreadable during prerequisite check");
      None
    }
  }
}
