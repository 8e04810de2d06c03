mod cmd;
mod output;
mod prompts;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use airpack_lib::pipeline::{BuildError, EXIT_PIPELINE};

use cmd::{BuildArgs, CacheCommand, ResolveArgs};
use output::{OutputFormat, Status, status};

/// airpack - build offline, relocatable application bundles
#[derive(Parser)]
#[command(name = "airpack")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,

  /// Arguments for the default `build` command
  #[command(flatten)]
  build: BuildArgs,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the bundle tree and archive (the default command)
  Build(BuildArgs),

  /// Resolve the dependency graph and print it without building
  Resolve(ResolveArgs),

  /// Check an archive against its content manifest
  Verify {
    /// Path to the `<bundle>.manifest.json` written next to the archive
    manifest: std::path::PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Inspect or clear the artifact cache
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },

  /// Create a starter airpack.toml and app/ directory
  Init {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    dir: std::path::PathBuf,

    /// Bundle name (default: the directory name)
    #[arg(long)]
    name: Option<String>,
  },
}

fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    None => cmd::cmd_build(cli.build),
    Some(Commands::Build(args)) => cmd::cmd_build(args),
    Some(Commands::Resolve(args)) => cmd::cmd_resolve(args),
    Some(Commands::Verify { manifest, output }) => cmd::cmd_verify(&manifest, output),
    Some(Commands::Cache { command }) => cmd::cmd_cache(command),
    Some(Commands::Init { dir, name }) => cmd::cmd_init(&dir, name),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => match err.downcast_ref::<BuildError>() {
      // The build error already names the stage and its cause.
      Some(build) => {
        status(Status::Failed, &build.to_string());
        ExitCode::from(build.exit_code() as u8)
      }
      None => {
        status(Status::Failed, &format!("{:#}", err));
        ExitCode::from(EXIT_PIPELINE as u8)
      }
    },
  }
}
