//! Directory-backed resource source.
//!
//! Treats a directory tree on disk as a bundle, reporting identifiers in the
//! shape a compiled artifact would expose them:
//!
//! ```text
//! ui/                       Plain                 CultureAware
//! ├── Main.qml          ->  ui.Main.qml           main.qml
//! └── Views/Detail.qml  ->  ui.Views.Detail.qml   views/detail.qml
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use glob::Pattern;
use tokio::fs;

use super::ResourceSource;

/// How identifiers are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierStyle {
    /// `<group>.<dir>.<file>.<ext>`
    Dotted,

    /// Lowercase, forward-slash separated
    Slashed,
}

/// A bundle laid out as plain files in a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    group: String,
    style: IdentifierStyle,
    identifiers: Vec<String>,
    files: HashMap<String, PathBuf>,
}

impl DirectorySource {
    /// Scan `root`; the group name defaults to the directory's file name
    pub fn open(root: &Path, style: IdentifierStyle) -> Result<Self> {
        let group = root
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("Bundle directory has no usable name: {}", root.display()))?
            .to_string();
        Self::open_with_group(root, group, style)
    }

    /// Scan `root` using an explicit group name
    pub fn open_with_group(root: &Path, group: impl Into<String>, style: IdentifierStyle) -> Result<Self> {
        let group = group.into();
        let root_str = root
            .to_str()
            .with_context(|| format!("Bundle path is not valid UTF-8: {}", root.display()))?;
        let pattern = format!("{}/**/*", Pattern::escape(root_str));

        let mut relative_paths = Vec::new();
        for entry in glob::glob(&pattern).context("Invalid bundle glob pattern")? {
            let path = entry.context("Failed to read bundle entry")?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("Entry escapes bundle root: {}", path.display()))?;
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            relative_paths.push((segments, path));
        }
        relative_paths.sort();

        let mut identifiers = Vec::with_capacity(relative_paths.len());
        let mut files: HashMap<String, PathBuf> = HashMap::with_capacity(relative_paths.len());
        for (segments, path) in relative_paths {
            let identifier = match style {
                IdentifierStyle::Dotted => format!("{}.{}", group, segments.join(".")),
                IdentifierStyle::Slashed => segments.join("/").to_lowercase(),
            };
            if let Some(previous) = files.get(&identifier) {
                anyhow::bail!(
                    "Bundle files {} and {} both map to identifier {}",
                    previous.display(),
                    path.display(),
                    identifier
                );
            }
            identifiers.push(identifier.clone());
            files.insert(identifier, path);
        }

        Ok(Self {
            group,
            style,
            identifiers,
            files,
        })
    }

    pub fn style(&self) -> IdentifierStyle {
        self.style
    }
}

#[async_trait]
impl ResourceSource for DirectorySource {
    fn group_name(&self) -> Option<String> {
        match self.style {
            // Plain bundles carry the group as the identifier prefix
            IdentifierStyle::Dotted => None,
            IdentifierStyle::Slashed => Some(format!("{}.g.resources", self.group)),
        }
    }

    async fn list_identifiers(&self) -> Result<Vec<String>> {
        Ok(self.identifiers.clone())
    }

    async fn read_bytes(&self, identifier: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.files.get(identifier) else {
            return Ok(None);
        };

        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read resource: {}", path.display())),
        }
    }
}
