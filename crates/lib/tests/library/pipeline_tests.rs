//! End-to-end builds against a local directory mirror.

use airpack_lib::consts::LOCK_FILENAME;
use airpack_lib::package::{ArchiveFormat, verify};
use airpack_lib::pipeline::{BuildState, FailureKind, Orchestrator, Stage};
use airpack_lib::resolve::ResolveError;
use airpack_lib::stage::StageError;
use airpack_lib::vendor::VendorError;

use super::common::Project;

#[tokio::test]
async fn builds_bundle_with_transitive_dependency() {
  let project = Project::with_dependency_chain();

  let outcome = Orchestrator::new().build(&project.request()).await.unwrap();

  let bundle = &outcome.bundle_dir;
  assert_eq!(bundle, &project.output_dir().join("assistant_offline"));
  assert!(bundle.join("runtime").join("python.exe").is_file());
  assert!(bundle.join("vendor").join("pkgA").join("pkgA").join("__init__.py").is_file());
  assert!(bundle.join("vendor").join("pkgB").join("pkgB").join("__init__.py").is_file());
  assert!(bundle.join("app").join("main.py").is_file());
  assert!(!bundle.join("app").join("__pycache__").exists());
  for name in ["run.bat", "start.bat", "config.template", "README.md", "version_info.json", LOCK_FILENAME] {
    assert!(bundle.join(name).is_file(), "missing {name}");
  }

  assert_eq!(outcome.graph.interpreter.version.to_string(), "3.11.4");
  assert_eq!(outcome.graph.packages["pkgB"].version.to_string(), "2.0.0");
  assert!(outcome.graph.packages["pkgA"].dependencies.contains("pkgB"));

  assert!(outcome.archive.ends_with("assistant_offline.zip"));
  assert!(outcome.archive.is_file());
  assert!(outcome.content_manifest.is_file());
  assert!(verify(&outcome.content_manifest).unwrap().is_ok());

  assert_eq!(outcome.states.first(), Some(&BuildState::Idle));
  assert_eq!(outcome.states.last(), Some(&BuildState::Done));
  assert_eq!(outcome.states.len(), Stage::ALL.len() + 2);
}

#[tokio::test]
async fn rebuild_produces_identical_archive() {
  let project = Project::with_dependency_chain();
  let orchestrator = Orchestrator::new();
  let mut request = project.request();
  request.overrides.clean = true;

  let first = orchestrator.build(&request).await.unwrap();
  let first_bytes = std::fs::read(&first.archive).unwrap();
  let second = orchestrator.build(&request).await.unwrap();
  let second_bytes = std::fs::read(&second.archive).unwrap();

  assert_eq!(first_bytes, second_bytes);
  assert_eq!(first.content, second.content);
}

#[tokio::test]
async fn tar_gz_format_is_honored() {
  let project = Project::with_dependency_chain();
  let mut request = project.request();
  request.overrides.format = Some(ArchiveFormat::TarGz);

  let outcome = Orchestrator::new().build(&request).await.unwrap();

  assert!(outcome.archive.ends_with("assistant_offline.tar.gz"));
  assert!(verify(&outcome.content_manifest).unwrap().is_ok());
}

#[tokio::test]
async fn conflicting_constraints_fail_before_output_is_created() {
  let project = Project::with_dependency_chain();
  project.write_manifest("\n[[package]]\nname = \"pkgB\"\nversion = \"<2.0\"\n");

  let err = Orchestrator::new().build(&project.request()).await.unwrap_err();

  assert_eq!(err.stage, Stage::Resolving);
  assert_eq!(err.exit_code(), 2);
  match &err.kind {
    FailureKind::Resolve(ResolveError::Unresolvable { package, .. }) => assert_eq!(package, "pkgB"),
    other => panic!("expected unresolvable, got {other:?}"),
  }
  assert!(!project.output_dir().exists());
}

#[tokio::test]
async fn checksum_mismatch_aborts_vendoring() {
  let project = Project::with_dependency_chain();
  let interpreter = project.add_artifact("python-3.11.4-embed-amd64.zip", &[("python.exe", "stub")]);
  let pkg_a = project.add_artifact("pkgA-1.5.0.zip", &[("pkgA/__init__.py", "A = 1\n")]);
  let pkg_b = project.add_artifact("pkgB-2.0.0.zip", &[("pkgB/__init__.py", "B = 2\n")]);
  project.write_index(&interpreter, &pkg_a, &pkg_b.url, &"0".repeat(64));

  let err = Orchestrator::new().build(&project.request()).await.unwrap_err();

  assert_eq!(err.stage, Stage::Vendoring);
  match &err.kind {
    FailureKind::Vendor(e @ VendorError::Integrity { .. }) => assert_eq!(e.package(), "pkgB"),
    other => panic!("expected integrity failure, got {other:?}"),
  }
  assert!(!project.output_dir().exists());
  let cached_pkg_b = walkdir::WalkDir::new(project.cache_dir().join("artifacts").join("pkgB"))
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .count();
  assert_eq!(cached_pkg_b, 0);
}

#[tokio::test]
async fn non_empty_output_is_left_alone() {
  let project = Project::with_dependency_chain();
  std::fs::create_dir_all(project.output_dir()).unwrap();
  std::fs::write(project.output_dir().join("keep.txt"), "mine").unwrap();

  let err = Orchestrator::new().build(&project.request()).await.unwrap_err();

  assert_eq!(err.stage, Stage::Staging);
  assert!(matches!(err.kind, FailureKind::Stage(StageError::OutputNotEmpty { .. })));
  assert_eq!(std::fs::read_to_string(project.output_dir().join("keep.txt")).unwrap(), "mine");
}

#[tokio::test]
async fn optional_package_missing_from_mirror_is_left_out() {
  let project = Project::with_dependency_chain();
  project.write_manifest("\n[[package]]\nname = \"browser\"\nversion = \"*\"\noptional = true\n");
  project.add_index_release("browser", "1.0.0", "files/browser-1.0.0.zip", &"1".repeat(64));

  let outcome = Orchestrator::new().build(&project.request()).await.unwrap();

  assert!(!outcome.graph.packages.contains_key("browser"));
  assert!(outcome.graph.skipped.contains("browser"));
  assert!(outcome.graph.packages.contains_key("pkgB"));
  assert!(!outcome.bundle_dir.join("vendor").join("browser").exists());
  let readme = std::fs::read_to_string(outcome.bundle_dir.join("README.md")).unwrap();
  assert!(readme.contains("## Not included"));
  assert!(verify(&outcome.content_manifest).unwrap().is_ok());
}

#[tokio::test]
async fn optional_package_on_mirror_is_bundled() {
  let project = Project::with_dependency_chain();
  project.write_manifest("\n[[package]]\nname = \"browser\"\nversion = \"*\"\noptional = true\n");
  let browser = project.add_artifact("browser-1.0.0.zip", &[("browser/__init__.py", "")]);
  project.add_index_release("browser", "1.0.0", &browser.url, &browser.checksum);

  let outcome = Orchestrator::new().build(&project.request()).await.unwrap();

  assert!(outcome.graph.skipped.is_empty());
  assert!(outcome.bundle_dir.join("vendor").join("browser").join("browser").join("__init__.py").is_file());
}
