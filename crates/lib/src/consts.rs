//! Shared names and defaults.

/// Application name, used for platform directories.
pub const APP_NAME: &str = "airpack";

/// Default manifest file name.
pub const MANIFEST_FILENAME: &str = "airpack.toml";

/// File name of the index snapshot, both on mirrors and in the cache.
pub const INDEX_FILENAME: &str = "index.json";

/// Resolved graph written into every bundle.
pub const LOCK_FILENAME: &str = "bundle.lock";

/// Default output directory, relative to the manifest directory.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Bundle name used when the manifest does not set one.
pub const DEFAULT_BUNDLE_NAME: &str = "bundle";

/// Default number of concurrent artifact fetches.
pub const DEFAULT_WORKERS: usize = 4;

/// Default network timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default retry count for transient fetch failures.
pub const DEFAULT_RETRIES: u32 = 2;

/// Suffix for in-progress outputs that are renamed into place on success.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "AIRPACK_CACHE_DIR";

/// Environment variable overriding the mirror.
pub const MIRROR_ENV: &str = "AIRPACK_MIRROR";

/// Environment variable pinning the bundle build time (seconds since epoch).
pub const SOURCE_DATE_EPOCH_ENV: &str = "SOURCE_DATE_EPOCH";
