//! # Tablesync Testkit
//!
//! Test utilities for tablesync.
//!
//! This crate provides:
//! - Document and operation builders
//! - A push harness wired to the in-memory collaborators
//! - Fault-injecting store and queue wrappers
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tablesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_an_insert() {
//!     let harness = Harness::new();
//!     harness.enqueue(insert_todo("1", "milk"));
//!     harness.push().await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
