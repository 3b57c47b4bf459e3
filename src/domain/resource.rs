//! Resources as they flow through a materialization session.
//!
//! A `ResourceRecord` is derived once per embedded identifier during
//! resolution and consumed by the materializer, which produces one
//! `MaterializedItem` per file it writes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a resource's bytes are written to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Markup or any other text payload
    Text,

    /// PNG image
    Image,
}

impl ResourceKind {
    /// Classify an identifier by its suffix (`.png` is an image, anything else text)
    pub fn from_identifier(identifier: &str) -> Self {
        if identifier.to_ascii_lowercase().ends_with(".png") {
            ResourceKind::Image
        } else {
            ResourceKind::Text
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Text => write!(f, "text"),
            ResourceKind::Image => write!(f, "image"),
        }
    }
}

/// Whether a path segment stays where it is joined.
///
/// `.`/`..`, backslashes and drive or stream separators (`:`) would let
/// `Path::join` climb out of or replace the root.
fn is_plain_segment(segment: &str) -> bool {
    segment != "." && segment != ".." && !segment.contains(['\\', ':'])
}

/// Whether every segment of a forward-slash relative path stays under its root
pub fn is_contained(relative: &str) -> bool {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .all(is_plain_segment)
}

/// Join a forward-slash relative path onto `root`, one segment at a time.
///
/// Segments that could escape `root` are dropped; callers that need to
/// refuse such paths check [`is_contained`] first.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty() && is_plain_segment(segment))
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// An embedded resource with its resolved output location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Identifier as reported by the resource source
    pub raw_identifier: String,

    /// Forward-slash relative path under the session root
    pub relative_path: String,

    /// Text or image
    pub kind: ResourceKind,
}

impl ResourceRecord {
    /// Create a record, classifying the kind from the raw identifier
    pub fn new(raw_identifier: impl Into<String>, relative_path: impl Into<String>) -> Self {
        let raw_identifier = raw_identifier.into();
        let kind = ResourceKind::from_identifier(&raw_identifier);
        Self {
            raw_identifier,
            relative_path: relative_path.into(),
            kind,
        }
    }

    /// Absolute destination of this record under `root`
    pub fn destination(&self, root: &Path) -> PathBuf {
        join_relative(root, &self.relative_path)
    }

    /// Whether the relative path stays under the session root
    pub fn is_contained(&self) -> bool {
        is_contained(&self.relative_path)
    }
}

/// A file written by the materializer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedItem {
    /// Text or image
    pub kind: ResourceKind,

    /// Where the file was written
    pub absolute_path: PathBuf,
}

impl MaterializedItem {
    pub fn new(kind: ResourceKind, absolute_path: PathBuf) -> Self {
        Self {
            kind,
            absolute_path,
        }
    }
}
