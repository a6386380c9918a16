//! # vmap Testkit
//!
//! Test utilities for vmap.
//!
//! This crate provides:
//! - Test fixtures: stores over every backend, deterministic roots
//! - Property-based test generators using proptest
//! - A reference model of the map to check histories against
//! - A backend-agnostic conformance suite for [`vmap_core::MapStorage`]
//! - Stress testing utilities
//! - Crash recovery harnesses for the journal
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmap_testkit::prelude::*;
//!
//! #[test]
//! fn memory_store_conforms() {
//!     let store = TestStore::memory();
//!     conformance::run_all(&*store);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance;
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use model::*;
pub use stress::*;
