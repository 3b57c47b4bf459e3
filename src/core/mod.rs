//! Core materialization logic.
//!
//! This module contains:
//! - Resolver: identifier to relative path mapping
//! - Planner: directory planning and creation
//! - Materializer: per-resource writes
//! - Session: orchestration of a full pass
//! - Cleanup: scoped teardown of the written tree

pub mod cleanup;
pub mod error;
pub mod hidden;
pub mod materializer;
pub mod planner;
pub mod resolver;
pub mod session;

// Re-export commonly used types
pub use cleanup::{CleanupHandle, TeardownReport};
pub use error::{HiddenAttributeError, MaterializeError, SessionFailure};
pub use materializer::{ImageHandling, MaterializerOptions, ResourceMaterializer};
pub use resolver::KnownPaths;
pub use session::{
    FailurePolicy, MaterializationReport, MaterializationSession, Materialized, SessionOptions,
    HIDDEN_PREFIX, KEEP_FLAG,
};
