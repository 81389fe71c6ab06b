//! # taskmirror Testkit
//!
//! Test utilities for taskmirror.
//!
//! This crate provides:
//! - JSON record and response fixtures in the sync wire format
//! - Property-based generators for entities and sync responses
//!
//! ## Usage
//!
//! ```rust
//! use taskmirror_testkit::prelude::*;
//!
//! let body = full_response("c1", vec![task_record("1", "Buy milk")]);
//! assert_eq!(body["full_sync"], true);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
