// src/errors.rs

//! Crate-wide error types.
//!
//! Errors are split by the phase in which they can occur:
//! - [`LockError`] and [`ExecError`] happen before the external process starts
//!   and are returned to the caller of `Coordinator::exec`.
//! - [`RecapError`] and [`PostRunError`] happen after the process has run and
//!   only ever end up in the run log and in tracing output.
//! - [`ClusterExecError`] covers configuration loading and the CLI surface.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterExecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Failure to take the per-cluster lock.
///
/// None of these are fatal; the caller may retry later.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("cluster '{cluster}' is busy: another job holds its lock")]
    Busy { cluster: String },

    #[error("invalid cluster name '{0}'")]
    InvalidCluster(String),

    #[error("lock file {path:?} for cluster '{cluster}': {source}")]
    Io {
        cluster: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The single error a caller of `Coordinator::exec` can observe.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid job type '{0}'")]
    InvalidJobType(String),

    #[error("cannot create {what} {path:?}: {source}")]
    Setup {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare for the task: {0}")]
    PreHook(#[source] anyhow::Error),

    #[error("failed to start command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("execution task ended before reporting whether the job started")]
    Aborted,
}

/// Failure to derive a verdict from the tool's output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecapError {
    #[error("recap banner not found in output")]
    BannerMissing,

    #[error("recap section contains no node lines")]
    EmptyRecap,

    #[error("malformed recap line: {0:?}")]
    MalformedLine(String),
}

/// Anything that goes wrong after the process has been started.
///
/// These are logged and appended to the run log, never returned to a caller.
#[derive(Error, Debug)]
pub enum PostRunError {
    #[error("run log: {0}")]
    Log(#[from] std::io::Error),

    #[error("recap: {0}")]
    Recap(#[from] RecapError),

    #[error("post-exec hook: {0}")]
    Hook(#[source] anyhow::Error),

    #[error("success ledger: {0}")]
    Ledger(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClusterExecError>;
