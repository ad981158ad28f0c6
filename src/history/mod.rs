// src/history/mod.rs

//! Run history on disk.
//!
//! Layout under the configured data directory:
//!
//! ```text
//! <data_dir>/<cluster>/history/<run_id>/command.log
//!                                      /command.string
//!                                      /command.yaml
//! ```
//!
//! - [`run_id`] generates sortable, time-based run identifiers.
//! - [`record`] renders the artifacts describing a launched run.

pub mod record;
pub mod run_id;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::errors::ExecError;

pub use record::RunRecord;
pub use run_id::{next_run_id, validate_job_type};

pub const HISTORY_DIR: &str = "history";
pub const COMMAND_LOG: &str = "command.log";
pub const COMMAND_STRING: &str = "command.string";
pub const COMMAND_YAML: &str = "command.yaml";

/// A freshly created run directory and the id it is named after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub run_id: String,
    pub path: PathBuf,
}

impl RunDir {
    pub fn log_path(&self) -> PathBuf {
        self.path.join(COMMAND_LOG)
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    data_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn history_dir(&self, cluster: &str) -> PathBuf {
        self.data_dir.join(cluster).join(HISTORY_DIR)
    }

    /// Create `<cluster>/history/<run_id>` for a new run of `job_type`.
    ///
    /// Both directory creations are idempotent.
    pub fn prepare_run_dir(
        &self,
        cluster: &str,
        job_type: &str,
    ) -> std::result::Result<RunDir, ExecError> {
        validate_job_type(job_type)?;
        let history = self.history_dir(cluster);
        fs::create_dir_all(&history).map_err(|source| ExecError::Setup {
            what: "history directory",
            path: history.clone(),
            source,
        })?;

        let run_id = next_run_id(job_type);
        let path = history.join(&run_id);
        fs::create_dir_all(&path).map_err(|source| ExecError::Setup {
            what: "run directory",
            path: path.clone(),
            source,
        })?;

        debug!(cluster, run_id = %run_id, path = %path.display(), "created run directory");
        Ok(RunDir { run_id, path })
    }

    /// Write `command.string` and `command.yaml` for a started run.
    pub fn persist_record(&self, record: &RunRecord) -> Result<()> {
        let string_path = record.run_dir.join(COMMAND_STRING);
        fs::write(&string_path, record.command_string())
            .with_context(|| format!("writing {:?}", string_path))?;

        let descriptor = record.descriptor().context("rendering run descriptor")?;
        let yaml_path = record.run_dir.join(COMMAND_YAML);
        fs::write(&yaml_path, descriptor).with_context(|| format!("writing {:?}", yaml_path))?;

        Ok(())
    }

    /// Remove a run directory left behind by a run that never started.
    pub fn discard_run_dir(&self, run: &RunDir) -> io::Result<()> {
        fs::remove_dir_all(&run.path)
    }

    /// Run ids recorded for `cluster`, oldest first.
    pub fn list_runs(&self, cluster: &str) -> io::Result<Vec<String>> {
        let history = self.history_dir(cluster);
        let entries = match fs::read_dir(&history) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        runs.sort();
        Ok(runs)
    }
}
