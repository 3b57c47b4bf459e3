//! Directory planning ahead of file writes.

use std::collections::HashSet;
use std::path::Path;

use tokio::fs;
use tracing::debug;

use crate::domain::join_relative;

use super::error::MaterializeError;

/// Directory portions of `relative_paths`, deduplicated in first-seen order.
///
/// Files at the root contribute nothing. Only leaf directories are listed;
/// creation is recursive.
pub fn plan<S: AsRef<str>>(relative_paths: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut directories = Vec::new();

    for path in relative_paths {
        let path = path.as_ref().trim_matches('/');
        let Some((directory, _file)) = path.rsplit_once('/') else {
            continue;
        };
        if directory.is_empty() {
            continue;
        }
        if seen.insert(directory.to_string()) {
            directories.push(directory.to_string());
        }
    }

    directories
}

/// Create every planned directory (and its parents) under `root`
pub async fn create_all(root: &Path, directories: &[String]) -> Result<(), MaterializeError> {
    for directory in directories {
        let path = join_relative(root, directory);
        fs::create_dir_all(&path)
            .await
            .map_err(|e| MaterializeError::io(&path, e))?;
        debug!(directory = %path.display(), "Created directory");
    }
    Ok(())
}
