// src/cli.rs

//! Command-line surface of the `fetchq` binary.

use std::num::NonZeroUsize;

use clap::{Parser, ValueEnum};

/// Arguments accepted by `fetchq`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fetchq",
    version,
    about = "Send a batch of HTTP requests through a prioritized, deduplicating queue.",
    long_about = None
)]
pub struct CliArgs {
    /// TOML file describing the service and its `[[request]]` entries.
    ///
    /// Falls back to `FETCHQ_CONFIG`, then `Fetchq.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Override `[service].max_concurrent` for this run.
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<NonZeroUsize>,

    /// error | warn | info | debug | trace. Beats `FETCHQ_LOG` when given.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the resolved plan and exit without sending.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
