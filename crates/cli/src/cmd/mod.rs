mod build;
mod cache;
mod init;
mod resolve;
mod verify;

pub use build::{BuildArgs, cmd_build};
pub use cache::{CacheCommand, cmd_cache};
pub use init::cmd_init;
pub use resolve::{ResolveArgs, cmd_resolve};
pub use verify::cmd_verify;
