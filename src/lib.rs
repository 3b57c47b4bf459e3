//! embedstage - Materialize embedded bundle resources onto disk
//!
//! Takes the resources bundled inside an artifact (markup, images and an
//! optional manifest of canonical names), writes them into a private hidden
//! directory next to the working directory, and hands back the entry file
//! path together with a handle that removes everything on teardown.
//!
//! # Architecture
//!
//! Data flows one way:
//! - Enumerate identifiers from a [`source::ResourceSource`]
//! - Resolve each identifier to a relative path
//! - Plan and create the directory tree
//! - Write every resource, collecting what was written
//! - Return the entry path and a [`core::CleanupHandle`]
//!
//! # Modules
//!
//! - `source`: Resource sources (in-memory, directory-backed)
//! - `core`: Resolution, planning, materialization, session, cleanup
//! - `domain`: Data structures (ResourceRecord, MaterializedItem, SourceMode)
//! - `config`: Layered configuration
//! - `cli`: Command-line harness
//!
//! # Usage
//!
//! ```bash
//! # Extract a bundle and keep it
//! embedstage extract ./ui --entry Main.qml
//!
//! # Extract, run a loader against the entry file, then clean up
//! embedstage run ./ui --entry Main.qml -- qml
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod source;

// Re-export main types at crate root for convenience
pub use core::{CleanupHandle, MaterializationSession, MaterializeError, Materialized, SessionOptions};
pub use domain::{MaterializedItem, ResourceKind, ResourceRecord, SourceMode};
pub use source::{DirectorySource, MemorySource, ResourceSource};
