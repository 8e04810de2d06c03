//! Library integration tests.

mod common;
mod pipeline_tests;
