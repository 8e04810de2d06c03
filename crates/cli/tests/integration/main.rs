//! CLI integration tests: full builds against a local directory mirror.

mod build_tests;
mod cache_tests;
mod common;
mod verify_tests;
