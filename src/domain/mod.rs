//! Domain types for embedstage.
//!
//! This module contains the core data structures:
//! - Resources: records derived from identifiers and the items written for them
//! - Mode: how a bundle's identifiers are enumerated

pub mod mode;
pub mod resource;

// Re-export commonly used types
pub use mode::{SourceMode, DEFAULT_MANIFEST};
pub use resource::{join_relative, MaterializedItem, ResourceKind, ResourceRecord};
