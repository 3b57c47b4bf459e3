//! In-memory resource source.
//!
//! Hosts that embed payloads with `include_bytes!` register them here.

use anyhow::Result;
use async_trait::async_trait;

use super::ResourceSource;

/// Ordered set of named payloads held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    group: Option<String>,
    entries: Vec<(String, Option<Vec<u8>>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource-group name reported to the session
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Add a resource; a later insert with the same identifier replaces the payload
    pub fn with_resource(mut self, identifier: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(identifier.into(), Some(bytes.into()));
        self
    }

    /// Add an identifier whose stream is unavailable
    pub fn with_unavailable(mut self, identifier: impl Into<String>) -> Self {
        self.insert(identifier.into(), None);
        self
    }

    fn insert(&mut self, identifier: String, bytes: Option<Vec<u8>>) {
        match self.entries.iter_mut().find(|(id, _)| *id == identifier) {
            Some(entry) => entry.1 = bytes,
            None => self.entries.push((identifier, bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResourceSource for MemorySource {
    fn group_name(&self) -> Option<String> {
        self.group.clone()
    }

    async fn list_identifiers(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn read_bytes(&self, identifier: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .iter()
            .find(|(id, _)| id == identifier)
            .and_then(|(_, bytes)| bytes.clone()))
    }
}
