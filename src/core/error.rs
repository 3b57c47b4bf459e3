//! Error taxonomy for materialization.

use std::path::PathBuf;

use thiserror::Error;

use super::cleanup::CleanupHandle;

/// Errors surfaced by the session, materializer and cleanup handle
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("No embedded resources found in bundle")]
    NoResourcesFound,

    #[error("I/O failure at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource source failed for '{identifier}': {message}")]
    Source { identifier: String, message: String },

    #[error("Resource '{identifier}' resolves outside the session root: {relative_path}")]
    UnsafePath {
        identifier: String,
        relative_path: String,
    },

    #[error("Resource stream unavailable: {0}")]
    MissingResource(String),

    #[error("Image codec failed for {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Background materialization task failed: {0}")]
    Task(String),
}

impl MaterializeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MaterializeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn from_source(identifier: impl Into<String>, err: anyhow::Error) -> Self {
        MaterializeError::Source {
            identifier: identifier.into(),
            message: format!("{:#}", err),
        }
    }
}

/// Marking the root directory hidden failed; logged, never fatal
#[derive(Debug, Error)]
pub enum HiddenAttributeError {
    #[error("Failed to set hidden attribute on {}: {message}", .path.display())]
    AttributeSetFailure { path: PathBuf, message: String },
}

/// A session build that stopped partway.
///
/// `partial` holds the files written before the failure when the session
/// left them in place; it is built with `keep_files` set so dropping it
/// leaves them on disk.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionFailure {
    #[source]
    pub error: MaterializeError,
    pub partial: Option<CleanupHandle>,
}

impl SessionFailure {
    pub(crate) fn bare(error: MaterializeError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl From<SessionFailure> for MaterializeError {
    fn from(failure: SessionFailure) -> Self {
        failure.error
    }
}
