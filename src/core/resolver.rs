//! Maps raw embedded identifiers to relative output paths.
//!
//! Plain bundles expose dotted names (`MyApp.Views.Main.qml`); culture-aware
//! sets expose lowercase slash paths and ship a manifest (`resources.txt`)
//! that restores the canonical casing.

use std::collections::HashMap;

use tracing::debug;

/// Lookup of canonical relative paths keyed case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownPaths {
    entries: HashMap<String, String>,
}

impl KnownPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest: one canonical relative path per line, CRLF or LF
    pub fn from_manifest(text: &str) -> Self {
        let mut known = Self::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            known.insert(line, line);
        }
        known
    }

    /// Register `canonical` under `key`; the key is folded before storage
    pub fn insert(&mut self, key: &str, canonical: &str) {
        self.entries
            .insert(lookup_key(key), normalize_separators(canonical));
    }

    /// Canonical path for an identifier, if the manifest lists it
    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.entries.get(&lookup_key(identifier)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Case-folded key with both separator styles unified
fn lookup_key(path: &str) -> String {
    normalize_separators(path).to_lowercase()
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Resolve a plain-mode identifier: `MyApp.Views.Main.qml` -> `Views/Main.qml`
pub fn resolve_plain(identifier: &str, bundle_root: &str) -> String {
    let prefix = format!("{}.", bundle_root);
    let name = identifier.strip_prefix(&prefix).unwrap_or(identifier);

    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, extension) = name.split_at(dot);
            format!("{}{}", stem.replace('.', "/"), extension)
        }
        _ => name.to_string(),
    }
}

/// Resolve a culture-aware identifier against the manifest
pub fn resolve_culture_aware(identifier: &str, known: &KnownPaths) -> String {
    match known.get(identifier) {
        Some(canonical) => canonical.to_string(),
        None => {
            debug!(identifier, "Identifier not in manifest, using as-is");
            normalize_separators(identifier)
        }
    }
}

/// Resolve either mode: a manifest selects culture-aware resolution
pub fn resolve(identifier: &str, bundle_root: &str, known: Option<&KnownPaths>) -> String {
    match known {
        Some(known) => resolve_culture_aware(identifier, known),
        None => resolve_plain(identifier, bundle_root),
    }
}
