//! Scoped teardown of a materialized tree.
//!
//! The handle owns every item a session wrote plus the session root. Teardown
//! runs at most once: explicitly through [`CleanupHandle::teardown`] or on drop.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::MaterializedItem;

use super::error::MaterializeError;

/// What a teardown call removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Files deleted individually
    pub files_removed: usize,

    /// Whether the root directory was removed by this call
    pub root_removed: bool,
}

/// Owns materialized files and deletes them on teardown unless kept
#[derive(Debug)]
pub struct CleanupHandle {
    items: Vec<MaterializedItem>,
    root: PathBuf,
    keep_files: bool,
    torn_down: bool,
}

impl CleanupHandle {
    pub fn new(items: Vec<MaterializedItem>, root: PathBuf, keep_files: bool) -> Self {
        Self {
            items,
            root,
            keep_files,
            torn_down: false,
        }
    }

    pub fn items(&self) -> &[MaterializedItem] {
        &self.items
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keep_files(&self) -> bool {
        self.keep_files
    }

    pub fn set_keep_files(&mut self, keep: bool) {
        self.keep_files = keep;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Delete tracked files and the root directory, unless keeping files.
    ///
    /// Only the first call that is not kept touches the filesystem; later
    /// calls return an empty report.
    ///
    /// Removal is synchronous so `Drop` can run it. From async code, call it
    /// inside `tokio::task::spawn_blocking`.
    pub fn teardown(&mut self) -> Result<TeardownReport, MaterializeError> {
        if self.torn_down {
            return Ok(TeardownReport::default());
        }
        if self.keep_files {
            debug!(root = %self.root.display(), "Keeping materialized files");
            return Ok(TeardownReport::default());
        }
        // Marked first so a failure below is not retried from Drop
        self.torn_down = true;

        let mut report = TeardownReport::default();
        for item in &self.items {
            match std::fs::remove_file(&item.absolute_path) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(MaterializeError::io(&item.absolute_path, e)),
            }
        }

        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => report.root_removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(MaterializeError::io(&self.root, e)),
        }

        info!(
            root = %self.root.display(),
            files = report.files_removed,
            "Removed materialized resources"
        );
        Ok(report)
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Teardown on drop failed");
        }
    }
}
