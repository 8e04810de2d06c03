//! Shared utilities.
//!
//! Hashing and small filesystem helpers used across the pipeline stages.

pub mod fs;
pub mod hash;
