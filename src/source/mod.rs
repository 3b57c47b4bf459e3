//! Resource sources a session can materialize from.
//!
//! A source stands in for "the resources embedded in this artifact". It is
//! handed to the session explicitly instead of being discovered from the
//! running executable.

pub mod directory;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use directory::DirectorySource;
pub use memory::MemorySource;

/// Enumeration and read access to a bundle's embedded resources
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Primary resource-group name, when the source knows one
    /// (e.g. `MyApp.g.resources` for a culture-aware set)
    fn group_name(&self) -> Option<String> {
        None
    }

    /// All resource identifiers, in the order they should be written
    async fn list_identifiers(&self) -> Result<Vec<String>>;

    /// Raw bytes of one resource; `None` when its stream is unavailable
    async fn read_bytes(&self, identifier: &str) -> Result<Option<Vec<u8>>>;
}
