//! Materialization Session Integration Tests
//!
//! Tests for end-to-end builds: layout, retention, teardown and failure handling.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use embedstage::core::resolver;
use embedstage::core::{FailurePolicy, MaterializationSession, MaterializeError, SessionOptions};
use embedstage::domain::SourceMode;
use embedstage::source::{MemorySource, ResourceSource};
use tempfile::TempDir;

const NO_ARGS: [&str; 0] = [];

/// Relative paths (forward slashes) of every file under `root`
fn files_under(root: &Path) -> BTreeSet<String> {
    fn walk(dir: &Path, root: &Path, out: &mut BTreeSet<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                let segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.insert(segments.join("/"));
            }
        }
    }

    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

fn plain_bundle() -> MemorySource {
    MemorySource::new()
        .with_resource("MyApp.Main.qml", "import QtQuick 2.0")
        .with_resource("MyApp.Views.Detail.qml", "Item {}")
        .with_resource("MyApp.Views.Parts.Header.qml", "Rectangle {}")
        .with_resource("MyApp.scripts.util.js", "function f() {}")
}

fn session(source: MemorySource, mode: SourceMode, base: &Path) -> MaterializationSession {
    MaterializationSession::new(Arc::new(source), mode, SessionOptions::in_dir(base))
}

#[tokio::test]
async fn test_plain_build_writes_every_resource() {
    let temp = TempDir::new().unwrap();
    let source = plain_bundle();
    let identifiers = source.list_identifiers().await.unwrap();

    let built = session(source, SourceMode::Plain, temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    let root = temp.path().join("~$MyApp");
    assert_eq!(built.cleanup.root(), root);
    assert_eq!(built.entry_path, root.join("Main.qml"));
    assert_eq!(built.bundle_name, "MyApp");

    let expected: BTreeSet<String> = identifiers
        .iter()
        .map(|id| resolver::resolve_plain(id, "MyApp"))
        .collect();
    assert_eq!(files_under(&root), expected);
    assert_eq!(built.cleanup.items().len(), identifiers.len());
}

#[tokio::test]
async fn test_items_follow_enumeration_order() {
    let temp = TempDir::new().unwrap();

    let built = session(plain_bundle(), SourceMode::Plain, temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    let root = built.cleanup.root().to_path_buf();
    let paths: Vec<PathBuf> = built
        .cleanup
        .items()
        .iter()
        .map(|item| item.absolute_path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            root.join("Main.qml"),
            root.join("Views").join("Detail.qml"),
            root.join("Views").join("Parts").join("Header.qml"),
            root.join("scripts").join("util.js"),
        ]
    );
}

#[tokio::test]
async fn test_text_content_is_exact() {
    let temp = TempDir::new().unwrap();
    let source = MemorySource::new().with_resource("App.qml", "import QtQuick 2.0");

    let built = session(source, SourceMode::Plain, temp.path())
        .build("App.qml", &NO_ARGS)
        .await
        .unwrap();

    // A single-segment identifier names the bundle after itself
    assert_eq!(built.entry_path, temp.path().join("~$App").join("App.qml"));
    assert_eq!(std::fs::read(&built.entry_path).unwrap(), b"import QtQuick 2.0");
}

#[tokio::test]
async fn test_teardown_removes_root() {
    let temp = TempDir::new().unwrap();

    let mut built = session(plain_bundle(), SourceMode::Plain, temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();
    let root = built.cleanup.root().to_path_buf();
    assert!(root.is_dir());

    let report = built.cleanup.teardown().unwrap();
    assert_eq!(report.files_removed, 4);
    assert!(!root.exists());

    // Second call is a no-op
    let again = built.cleanup.teardown().unwrap();
    assert_eq!(again.files_removed, 0);
    assert!(!again.root_removed);
}

#[tokio::test]
async fn test_keep_flag_retains_files() {
    let temp = TempDir::new().unwrap();

    let mut built = session(plain_bundle(), SourceMode::Plain, temp.path())
        .build("Main.qml", &["app", "--keep"])
        .await
        .unwrap();
    assert!(built.cleanup.keep_files());

    built.cleanup.teardown().unwrap();
    drop(built);

    let root = temp.path().join("~$MyApp");
    assert_eq!(files_under(&root).len(), 4);
    assert_eq!(
        std::fs::read_to_string(root.join("Main.qml")).unwrap(),
        "import QtQuick 2.0"
    );
}

#[tokio::test]
async fn test_pre_existing_root_forces_keep() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("~$MyApp");
    std::fs::create_dir_all(&root).unwrap();

    let built = session(plain_bundle(), SourceMode::Plain, temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();
    assert!(built.cleanup.keep_files());

    drop(built);
    assert!(root.join("Main.qml").is_file());
}

#[tokio::test]
async fn test_drop_without_keep_cleans_up() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("~$MyApp");

    {
        let built = session(plain_bundle(), SourceMode::Plain, temp.path())
            .build("Main.qml", &NO_ARGS)
            .await
            .unwrap();
        assert!(root.is_dir());
        assert!(!built.cleanup.keep_files());
    }

    assert!(!root.exists());
}

#[tokio::test]
async fn test_empty_bundle_creates_nothing() {
    let temp = TempDir::new().unwrap();

    let result = session(MemorySource::new(), SourceMode::Plain, temp.path())
        .build("Main.qml", &NO_ARGS)
        .await;

    let failure = result.unwrap_err();
    assert!(matches!(failure.error, MaterializeError::NoResourcesFound));
    assert!(failure.partial.is_none());
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_culture_aware_uses_manifest() {
    let temp = TempDir::new().unwrap();
    let source = MemorySource::new()
        .with_group("MyApp.g.resources")
        .with_resource("main.qml", "import QtQuick 2.0")
        .with_resource("views/main.qml", "Item {}")
        .with_resource("unknownfile.txt", "plain")
        .with_resource("resources.txt", "Main.qml\r\nViews\\Main.qml\r\nresources.txt");

    let built = session(source, SourceMode::culture_aware(), temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    let root = temp.path().join("~$MyApp");
    // Entry name is case-folded, then restored through the manifest
    assert_eq!(built.entry_path, root.join("Main.qml"));
    assert!(built.entry_path.is_file());
    assert_eq!(
        std::fs::read_to_string(&built.entry_path).unwrap(),
        "import QtQuick 2.0"
    );
    assert_eq!(
        files_under(&root),
        ["Main.qml", "Views/Main.qml", "unknownfile.txt", "resources.txt"]
            .into_iter()
            .map(String::from)
            .collect()
    );
}

#[tokio::test]
async fn test_culture_aware_without_manifest_falls_back() {
    let temp = TempDir::new().unwrap();
    let source = MemorySource::new()
        .with_group("MyApp.g.resources")
        .with_resource("main.qml", "ApplicationWindow {}")
        .with_resource("views/detail.qml", "Item {}");

    let built = session(source, SourceMode::culture_aware(), temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    let root = temp.path().join("~$MyApp");
    assert!(root.join("views").join("detail.qml").is_file());
    assert_eq!(built.entry_path, root.join("main.qml"));
    assert!(built.entry_path.is_file());
}

#[tokio::test]
async fn test_missing_stream_lenient_and_strict() {
    let lenient_dir = TempDir::new().unwrap();
    let source = || {
        MemorySource::new()
            .with_resource("MyApp.Main.qml", "x")
            .with_unavailable("MyApp.Gone.qml")
    };

    let built = session(source(), SourceMode::Plain, lenient_dir.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();
    let gone = built.cleanup.root().join("Gone.qml");
    assert_eq!(std::fs::metadata(gone).unwrap().len(), 0);

    let strict_dir = TempDir::new().unwrap();
    let mut options = SessionOptions::in_dir(strict_dir.path());
    options.materializer.strict_missing = true;
    let failure = MaterializationSession::new(Arc::new(source()), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, MaterializeError::MissingResource(ref id) if id == "MyApp.Gone.qml"));
}

/// Source whose reads fail for some identifiers
struct FailingSource {
    inner: MemorySource,
    failing: &'static [&'static str],
}

#[async_trait]
impl ResourceSource for FailingSource {
    async fn list_identifiers(&self) -> Result<Vec<String>> {
        self.inner.list_identifiers().await
    }

    async fn read_bytes(&self, identifier: &str) -> Result<Option<Vec<u8>>> {
        if self.failing.contains(&identifier) {
            anyhow::bail!("stream read failed");
        }
        self.inner.read_bytes(identifier).await
    }
}

fn failing_source() -> FailingSource {
    FailingSource {
        inner: plain_bundle(),
        failing: &["MyApp.Views.Parts.Header.qml"],
    }
}

#[tokio::test]
async fn test_failure_leaves_partial_tree() {
    let temp = TempDir::new().unwrap();

    let failure = MaterializationSession::new(
        Arc::new(failing_source()),
        SourceMode::Plain,
        SessionOptions::in_dir(temp.path()),
    )
    .build("Main.qml", &NO_ARGS)
    .await
    .unwrap_err();

    assert!(matches!(failure.error, MaterializeError::Source { .. }));
    let mut partial = failure.partial.expect("partial handle");
    assert_eq!(partial.items().len(), 2);
    assert!(partial.keep_files());

    let root = temp.path().join("~$MyApp");
    assert!(root.join("Main.qml").is_file());

    // Caller decides to discard
    partial.set_keep_files(false);
    partial.teardown().unwrap();
    assert!(!root.exists());
}

#[tokio::test]
async fn test_failure_with_rollback_removes_root() {
    let temp = TempDir::new().unwrap();
    let mut options = SessionOptions::in_dir(temp.path());
    options.failure_policy = FailurePolicy::Rollback;

    let failure = MaterializationSession::new(Arc::new(failing_source()), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    assert!(failure.partial.is_none());
    assert!(!temp.path().join("~$MyApp").exists());
}

#[tokio::test]
async fn test_rollback_spares_pre_existing_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("~$MyApp");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("notes.txt"), "from an earlier run").unwrap();

    let mut options = SessionOptions::in_dir(temp.path());
    options.failure_policy = FailurePolicy::Rollback;

    MaterializationSession::new(Arc::new(failing_source()), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    assert!(root.join("notes.txt").is_file());
    assert!(!root.join("Main.qml").exists());
}

#[tokio::test]
async fn test_concurrent_writes_match_sequential() {
    let sequential_dir = TempDir::new().unwrap();
    let concurrent_dir = TempDir::new().unwrap();

    let sequential = session(plain_bundle(), SourceMode::Plain, sequential_dir.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    let mut options = SessionOptions::in_dir(concurrent_dir.path());
    options.concurrency = 3;
    let concurrent = MaterializationSession::new(Arc::new(plain_bundle()), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap();

    assert_eq!(
        files_under(sequential.cleanup.root()),
        files_under(concurrent.cleanup.root())
    );

    let relative = |built: &embedstage::Materialized| -> Vec<PathBuf> {
        built
            .cleanup
            .items()
            .iter()
            .map(|item| item.absolute_path.strip_prefix(built.cleanup.root()).unwrap().to_path_buf())
            .collect()
    };
    assert_eq!(relative(&sequential), relative(&concurrent));
}

#[tokio::test]
async fn test_spawned_build_hands_off_entry() {
    let temp = TempDir::new().unwrap();

    let handle = session(plain_bundle(), SourceMode::Plain, temp.path())
        .spawn("Main.qml".to_string(), vec!["app".to_string()]);
    let built = handle.await.unwrap().unwrap();

    assert_eq!(
        std::fs::read_to_string(built.entry_path_string()).unwrap(),
        "import QtQuick 2.0"
    );

    let report = built.report();
    assert_eq!(report.bundle, "MyApp");
    assert_eq!(report.items.len(), 4);
    assert!(!report.keep_files);
}

#[tokio::test]
async fn test_escaping_identifier_is_refused_before_writing() {
    let temp = TempDir::new().unwrap();
    let victim = temp.path().join("victim.txt");
    std::fs::write(&victim, "keep me").unwrap();

    let source = MemorySource::new()
        .with_group("MyApp.g.resources")
        .with_resource("main.qml", "import QtQuick 2.0")
        .with_resource("../victim.txt", "overwritten");

    let failure = session(source, SourceMode::culture_aware(), temp.path())
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        MaterializeError::UnsafePath { ref identifier, .. } if identifier == "../victim.txt"
    ));
    assert!(failure.partial.is_none());
    drop(failure);

    assert_eq!(std::fs::read_to_string(&victim).unwrap(), "keep me");
    assert!(!temp.path().join("~$MyApp").exists());
}

#[tokio::test]
async fn test_concurrent_failure_tracks_every_written_file() {
    let temp = TempDir::new().unwrap();
    let mut options = SessionOptions::in_dir(temp.path());
    options.concurrency = 3;
    let source = FailingSource {
        inner: plain_bundle(),
        failing: &["MyApp.Views.Detail.qml", "MyApp.Views.Parts.Header.qml"],
    };

    let failure = MaterializationSession::new(Arc::new(source), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    // First failure in enumeration order, regardless of completion order
    assert!(matches!(
        failure.error,
        MaterializeError::Source { ref identifier, .. } if identifier == "MyApp.Views.Detail.qml"
    ));

    let root = temp.path().join("~$MyApp");
    let partial = failure.partial.expect("partial handle");
    let written: Vec<PathBuf> = partial
        .items()
        .iter()
        .map(|item| item.absolute_path.clone())
        .collect();
    assert_eq!(
        written,
        vec![root.join("Main.qml"), root.join("scripts").join("util.js")]
    );
    assert!(written.iter().all(|path| path.is_file()));
}

#[tokio::test]
async fn test_concurrent_failure_with_rollback_removes_root() {
    let temp = TempDir::new().unwrap();
    let mut options = SessionOptions::in_dir(temp.path());
    options.concurrency = 3;
    options.failure_policy = FailurePolicy::Rollback;

    let failure = MaterializationSession::new(Arc::new(failing_source()), SourceMode::Plain, options)
        .build("Main.qml", &NO_ARGS)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, MaterializeError::Source { .. }));
    assert!(failure.partial.is_none());
    assert!(!temp.path().join("~$MyApp").exists());
}
