//! examforge-core — Question model, auto-detection, validation, and grading.
//!
//! This crate defines the fundamental data model, the closed type registry,
//! and the pure algorithms (type detection, four-layer validation, grading)
//! that the rest of examforge builds on. It performs no storage I/O; the
//! only filesystem access is the optional asset-existence layer of the
//! validator.

pub mod detect;
pub mod error;
pub mod grade;
pub mod model;
pub mod raw;
pub mod registry;
pub mod validate;
