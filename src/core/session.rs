//! One materialization pass over a resource source.
//!
//! Enumerates identifiers, resolves them to relative paths, creates the
//! directory plan under a hidden root and writes every resource, handing
//! back the entry file path with a [`CleanupHandle`] for the written tree.
//!
//! # Root Layout
//!
//! ```text
//! <base_dir>/
//! └── ~$<bundle>/          # hidden, removed on teardown unless kept
//!     ├── Main.qml
//!     └── Views/
//!         └── Detail.qml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::domain::{join_relative, MaterializedItem, ResourceRecord, SourceMode};
use crate::source::ResourceSource;

use super::cleanup::CleanupHandle;
use super::error::{MaterializeError, SessionFailure};
use super::hidden;
use super::materializer::{MaterializerOptions, ResourceMaterializer};
use super::planner;
use super::resolver::{self, KnownPaths};

/// Prefix that namespaces the session root and marks it transient
pub const HIDDEN_PREFIX: &str = "~$";

/// Command-line flag that retains materialized files after teardown
pub const KEEP_FLAG: &str = "--keep";

/// What happens to already-written files when a build fails partway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave them for inspection; the partial handle is returned to the caller
    #[default]
    Leave,

    /// Remove what this build wrote before returning the error.
    ///
    /// When the root survives from an earlier run, only the files this build
    /// wrote are removed and the root is kept. A file this build overwrote at
    /// the same path as an earlier run's file is removed too; the earlier
    /// content is not restored.
    Rollback,
}

/// Knobs for a session, usually produced by [`crate::config`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Directory the hidden root is created in
    pub base_dir: PathBuf,

    /// Prefix for the root directory name
    pub hidden_prefix: String,

    /// Argument that requests retention
    pub keep_flag: String,

    /// Retain files regardless of arguments
    pub keep: bool,

    pub materializer: MaterializerOptions,

    pub failure_policy: FailurePolicy,

    /// Number of resources written at once (1 = sequential)
    pub concurrency: usize,
}

impl SessionOptions {
    /// Defaults rooted at `base_dir`
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            hidden_prefix: HIDDEN_PREFIX.to_string(),
            keep_flag: KEEP_FLAG.to_string(),
            keep: false,
            materializer: MaterializerOptions::default(),
            failure_policy: FailurePolicy::default(),
            concurrency: 1,
        }
    }

    /// Whether retention was requested, either here or on the command line
    pub fn keep_requested<S: AsRef<str>>(&self, args: &[S]) -> bool {
        self.keep || args.iter().any(|arg| arg.as_ref() == self.keep_flag)
    }
}

/// Result of a successful build
#[derive(Debug)]
pub struct Materialized {
    /// Absolute path of the entry file
    pub entry_path: PathBuf,

    /// Owns the written tree
    pub cleanup: CleanupHandle,

    /// Name the root directory was derived from
    pub bundle_name: String,

    pub mode: SourceMode,

    pub completed_at: DateTime<Utc>,
}

impl Materialized {
    /// Entry path as a string for loaders that take one
    pub fn entry_path_string(&self) -> String {
        self.entry_path.to_string_lossy().into_owned()
    }

    pub fn report(&self) -> MaterializationReport {
        MaterializationReport {
            bundle: self.bundle_name.clone(),
            mode: self.mode.clone(),
            root: self.cleanup.root().to_path_buf(),
            entry_path: self.entry_path.clone(),
            keep_files: self.cleanup.keep_files(),
            completed_at: self.completed_at,
            items: self.cleanup.items().to_vec(),
        }
    }
}

/// Serializable summary of what a build wrote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub bundle: String,
    pub mode: SourceMode,
    pub root: PathBuf,
    pub entry_path: PathBuf,
    pub keep_files: bool,
    pub completed_at: DateTime<Utc>,
    pub items: Vec<MaterializedItem>,
}

/// Derive the bundle name the root directory is named after.
///
/// Culture-aware sets use their group name (`MyApp.g.resources` -> `MyApp`);
/// otherwise the first identifier's leading segment is used.
pub fn bundle_name(mode: &SourceMode, group: Option<&str>, first_identifier: &str) -> String {
    if let (true, Some(group)) = (mode.is_culture_aware(), group) {
        let name = group.strip_suffix(".resources").unwrap_or(group);
        let name = name.strip_suffix(".g").unwrap_or(name);
        return name.to_string();
    }

    first_identifier
        .split(['.', '/'])
        .next()
        .unwrap_or(first_identifier)
        .to_string()
}

/// Orchestrates resolution, planning and materialization for one source
pub struct MaterializationSession {
    source: Arc<dyn ResourceSource>,
    mode: SourceMode,
    options: SessionOptions,
}

impl MaterializationSession {
    pub fn new(source: Arc<dyn ResourceSource>, mode: SourceMode, options: SessionOptions) -> Self {
        Self {
            source,
            mode,
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Run [`Self::build`] as a background task
    pub fn spawn(
        self,
        entry_file: String,
        args: Vec<String>,
    ) -> JoinHandle<Result<Materialized, SessionFailure>> {
        tokio::spawn(async move { self.build(&entry_file, args.as_slice()).await })
    }

    /// Materialize every resource and return the entry path with its cleanup handle
    #[instrument(skip(self, args), fields(mode = %self.mode))]
    pub async fn build<S: AsRef<str>>(
        &self,
        entry_file: &str,
        args: &[S],
    ) -> Result<Materialized, SessionFailure> {
        let identifiers = self
            .source
            .list_identifiers()
            .await
            .map_err(|e| SessionFailure::bare(MaterializeError::from_source("<bundle>", e)))?;

        let Some(first) = identifiers.first() else {
            return Err(SessionFailure::bare(MaterializeError::NoResourcesFound));
        };

        let group = self.source.group_name();
        let bundle = bundle_name(&self.mode, group.as_deref(), first);
        let root = self
            .options
            .base_dir
            .join(format!("{}{}", self.options.hidden_prefix, bundle));

        let (records, known) = self.resolve_records(&bundle, &identifiers).await?;
        if let Some(unsafe_record) = records.iter().find(|r| !r.is_contained()) {
            return Err(SessionFailure::bare(MaterializeError::UnsafePath {
                identifier: unsafe_record.raw_identifier.clone(),
                relative_path: unsafe_record.relative_path.clone(),
            }));
        }
        let relative_paths: Vec<&str> = records.iter().map(|r| r.relative_path.as_str()).collect();
        let directories = planner::plan(relative_paths.as_slice());

        let pre_existing = fs::try_exists(&root)
            .await
            .map_err(|e| SessionFailure::bare(MaterializeError::io(&root, e)))?;
        let keep_files = self.options.keep_requested(args) || pre_existing;

        info!(
            bundle = %bundle,
            root = %root.display(),
            resources = records.len(),
            pre_existing,
            keep_files,
            "Materializing resources"
        );

        fs::create_dir_all(&root)
            .await
            .map_err(|e| SessionFailure::bare(MaterializeError::io(&root, e)))?;

        if let Err(e) = hidden::mark_hidden(&root) {
            warn!(error = %e, "Could not mark resource root hidden");
        }

        if let Err(e) = planner::create_all(&root, &directories).await {
            return Err(self.fail(e, Vec::new(), root, pre_existing).await);
        }

        let (items, failure) = self.write_all(&records, &root).await;
        if let Some(e) = failure {
            return Err(self.fail(e, items, root, pre_existing).await);
        }

        // Culture-aware entries are case-folded, then mapped through the
        // manifest like any other resource
        let entry_name = match &known {
            Some(known) => resolver::resolve_culture_aware(&entry_file.to_lowercase(), known),
            None => entry_file.to_string(),
        };
        let entry_path = join_relative(&root, &entry_name);
        if !entry_path.is_file() {
            warn!(entry = %entry_path.display(), "Entry file was not among the materialized resources");
        }

        info!(files = items.len(), entry = %entry_path.display(), "Materialization complete");

        Ok(Materialized {
            entry_path,
            cleanup: CleanupHandle::new(items, root, keep_files),
            bundle_name: bundle,
            mode: self.mode.clone(),
            completed_at: Utc::now(),
        })
    }

    /// Read the manifest (culture-aware only) and resolve every identifier
    async fn resolve_records(
        &self,
        bundle: &str,
        identifiers: &[String],
    ) -> Result<(Vec<ResourceRecord>, Option<KnownPaths>), SessionFailure> {
        let known = match &self.mode {
            SourceMode::Plain => None,
            SourceMode::CultureAware { manifest } => Some(self.load_manifest(manifest).await?),
        };

        let records = identifiers
            .iter()
            .map(|id| ResourceRecord::new(id.clone(), resolver::resolve(id, bundle, known.as_ref())))
            .collect();
        Ok((records, known))
    }

    async fn load_manifest(&self, manifest: &str) -> Result<KnownPaths, SessionFailure> {
        let bytes = self
            .source
            .read_bytes(manifest)
            .await
            .map_err(|e| SessionFailure::bare(MaterializeError::from_source(manifest, e)))?;

        match bytes {
            Some(bytes) => {
                let known = KnownPaths::from_manifest(&String::from_utf8_lossy(&bytes));
                debug!(manifest, entries = known.len(), "Loaded resource manifest");
                Ok(known)
            }
            None => {
                warn!(manifest, "Resource manifest unavailable, using identifiers as-is");
                Ok(KnownPaths::new())
            }
        }
    }

    /// Write every record; returns the items written and the first failure, if any
    async fn write_all(
        &self,
        records: &[ResourceRecord],
        root: &Path,
    ) -> (Vec<MaterializedItem>, Option<MaterializeError>) {
        let materializer = ResourceMaterializer::new(self.options.materializer.clone());

        if self.options.concurrency <= 1 {
            let mut items = Vec::with_capacity(records.len());
            for record in records {
                match materializer.materialize(self.source.as_ref(), record, root).await {
                    Ok(item) => items.push(item),
                    Err(e) => return (items, Some(e)),
                }
            }
            return (items, None);
        }

        let permits = Arc::new(Semaphore::new(self.options.concurrency));
        let mut tasks = JoinSet::new();
        for (index, record) in records.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let materializer = materializer.clone();
            let permits = Arc::clone(&permits);
            let root = root.to_path_buf();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = materializer.materialize(source.as_ref(), &record, &root).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<MaterializedItem, MaterializeError>>> =
            (0..records.len()).map(|_| None).collect();
        let mut task_failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => task_failure = Some(MaterializeError::Task(e.to_string())),
            }
        }

        let mut items = Vec::with_capacity(records.len());
        let mut failure = None;
        for result in results.into_iter().flatten() {
            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        (items, failure.or(task_failure))
    }

    /// Apply the failure policy to a partially written tree
    async fn fail(
        &self,
        error: MaterializeError,
        items: Vec<MaterializedItem>,
        root: PathBuf,
        pre_existing: bool,
    ) -> SessionFailure {
        warn!(error = %error, written = items.len(), policy = ?self.options.failure_policy, "Materialization failed");

        match self.options.failure_policy {
            FailurePolicy::Leave => SessionFailure {
                error,
                partial: Some(CleanupHandle::new(items, root, true)),
            },
            FailurePolicy::Rollback if pre_existing => {
                // The root belongs to an earlier run; only undo this attempt's files
                for item in &items {
                    if let Err(e) = fs::remove_file(&item.absolute_path).await {
                        debug!(path = %item.absolute_path.display(), error = %e, "Rollback could not remove file");
                    }
                }
                SessionFailure::bare(error)
            }
            FailurePolicy::Rollback => {
                // Teardown is synchronous (it also runs from Drop); keep it off the runtime threads
                let rollback = tokio::task::spawn_blocking(move || {
                    CleanupHandle::new(items, root, false).teardown()
                })
                .await;
                match rollback {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Rollback teardown failed"),
                    Err(e) => warn!(error = %e, "Rollback task failed"),
                }
                SessionFailure::bare(error)
            }
        }
    }
}
