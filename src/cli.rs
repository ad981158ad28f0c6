// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `cluster-exec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cluster-exec",
    version,
    about = "Run automation jobs against a cluster, one at a time, and record their outcome.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `CLUSTER_EXEC_CONFIG`, then `ClusterExec.toml` if it exists,
    /// then built-in defaults.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLUSTER_EXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Start a job, print its run id, and wait for its verdict.
    Run(RunArgs),

    /// Show whether a cluster is locked and by which run.
    Status {
        #[arg(long)]
        cluster: String,
    },

    /// List recorded runs for a cluster.
    History {
        #[arg(long)]
        cluster: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Cluster to run against; at most one job runs per cluster.
    #[arg(long)]
    pub cluster: String,

    /// Job type tag, appended to the run id and recorded in the ledger.
    #[arg(long = "type", value_name = "TYPE")]
    pub job_type: String,

    /// Working directory of the command.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Environment entry for the command; repeatable. When given, the command
    /// sees only these variables.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Do not evaluate the recap (and never record a success).
    #[arg(long)]
    pub no_recap: bool,

    /// Program and arguments. `{run_dir}` is replaced by the run directory.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
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
