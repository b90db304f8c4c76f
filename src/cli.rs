// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::{Verbosity, parse_duration};

/// Command-line arguments for `batchbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchbuild",
    version,
    about = "Build batches of project/target pairs in parallel through an external build tool.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Batchbuild.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Concurrency limit for every batch, overriding the config file.
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Run only the batch with this name.
    #[arg(long, value_name = "NAME")]
    pub batch: Option<String>,

    /// Console verbosity (quiet, minimal, normal, detailed, diagnostic).
    #[arg(long, short = 'v', value_enum, value_name = "LEVEL")]
    pub verbosity: Option<Verbosity>,

    /// Per-batch timeout such as `90s` or `10m`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHBUILD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the batches, but don't start any builds.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
