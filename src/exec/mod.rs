// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`job`] defines [`JobSpec`], the caller's description of a run, and the
//!   hook types it carries.
//! - [`coordinator`] owns the lock / spawn / wait / recap lifecycle and the
//!   handshake that returns the run id to the caller early.
//! - [`run_log`] wraps the per-run `command.log` the process writes into.

pub mod coordinator;
pub mod job;
pub mod run_log;

pub use coordinator::{Coordinator, RunHandle};
pub use job::{JobSpec, PostExecHook, PreExecHook, RUN_DIR_PLACEHOLDER};
pub use run_log::{POST_EXEC_DIVIDER, RunLog};
