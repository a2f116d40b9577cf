//! # DeskStore Testkit
//!
//! Test utilities for DeskStore.
//!
//! This crate provides:
//! - Record stores with a frozen clock and deterministic ids
//! - Remote stores with scripted failures
//! - Property-based test generators using proptest
//! - Multi-threaded stress helpers
//! - Log capture through `tracing-subscriber`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deskstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         store.create("todos", "u1", fields(json!({"title": "A"}))).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod remotes;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::remotes::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use remotes::*;
pub use stress::*;
