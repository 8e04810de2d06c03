//! airpack-lib: offline bundle builder.
//!
//! This crate turns a declarative manifest into a relocatable, network-free
//! bundle of an application, its interpreter runtime and every transitive
//! package, plus a reproducible archive of that bundle:
//! - `manifest`: reads `airpack.toml`
//! - `index` / `resolve`: pins the full dependency closure against an index snapshot
//! - `cache` / `vendor`: fetches and verifies artifacts through a persistent cache
//! - `stage` / `template`: lays out the bundle tree and its starter files
//! - `package`: writes the deterministic archive and its content manifest
//! - `pipeline`: the build orchestrator state machine
//! - `init`: scaffolds a new project

pub mod cache;
pub mod config;
pub mod consts;
pub mod fetch;
pub mod index;
pub mod init;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod prereq;
pub mod resolve;
pub mod stage;
pub mod template;
pub mod util;
pub mod vendor;
pub mod version;
