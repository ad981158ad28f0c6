// src/ledger.rs

//! Success ledger: durable record of job types that completed successfully
//! on each cluster.
//!
//! The coordinator only depends on [`SuccessLedger`]. Appends for one cluster
//! are serialized by that cluster's lock, but appends for different clusters
//! may arrive concurrently, so implementations take `&self` and must be
//! `Sync`.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ConfigFile;

pub const DEFAULT_LEDGER_FILE: &str = "success_tasks.jsonl";

/// One successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessTask {
    #[serde(rename = "type")]
    pub job_type: String,
    pub timestamp: DateTime<Local>,
    pub run_id: String,
}

pub trait SuccessLedger: Send + Sync {
    fn append_success(&self, cluster: &str, task: SuccessTask) -> Result<()>;
}

/// Appends JSON lines to `<data_dir>/<cluster>/<file_name>`.
#[derive(Debug)]
pub struct FileSuccessLedger {
    data_dir: PathBuf,
    file_name: String,
    write_guard: Mutex<()>,
}

impl FileSuccessLedger {
    pub fn new(data_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_name: file_name.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn ledger_path(&self, cluster: &str) -> PathBuf {
        self.data_dir.join(cluster).join(&self.file_name)
    }

    /// All recorded successes for `cluster`, oldest first.
    pub fn successes(&self, cluster: &str) -> Result<Vec<SuccessTask>> {
        let path = self.ledger_path(cluster);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("opening success ledger at {:?}", path))?;
        let mut tasks = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let task = serde_json::from_str(&line)
                .with_context(|| format!("parsing line {} of {:?}", idx + 1, path))?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}

impl SuccessLedger for FileSuccessLedger {
    fn append_success(&self, cluster: &str, task: SuccessTask) -> Result<()> {
        let path = self.ledger_path(cluster);
        let mut line = serde_json::to_string(&task).context("serializing success task")?;
        line.push('\n');

        let _guard = self.write_guard.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating ledger directory at {:?}", parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening success ledger at {:?}", path))?;
        // One write per record so concurrent O_APPEND writers never interleave.
        file.write_all(line.as_bytes())
            .with_context(|| format!("appending to success ledger at {:?}", path))?;

        info!(cluster, job_type = %task.job_type, run_id = %task.run_id, "recorded successful run");
        Ok(())
    }
}

/// Keeps successes in memory only.
#[derive(Debug, Default)]
pub struct MemorySuccessLedger {
    entries: Mutex<Vec<(String, SuccessTask)>>,
}

impl MemorySuccessLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(cluster, task)` pair in append order.
    pub fn entries(&self) -> Vec<(String, SuccessTask)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_cluster(&self, cluster: &str) -> Vec<SuccessTask> {
        self.entries()
            .into_iter()
            .filter(|(c, _)| c == cluster)
            .map(|(_, task)| task)
            .collect()
    }
}

impl SuccessLedger for MemorySuccessLedger {
    fn append_success(&self, cluster: &str, task: SuccessTask) -> Result<()> {
        debug!(cluster, run_id = %task.run_id, "recorded successful run (memory)");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((cluster.to_string(), task));
        Ok(())
    }
}

/// The ledger selected by the `[ledger]` config section.
pub fn ledger_from_config(cfg: &ConfigFile) -> Arc<dyn SuccessLedger> {
    if cfg.ledger.enabled {
        Arc::new(FileSuccessLedger::new(
            cfg.data_dir(),
            cfg.ledger.file_name.clone(),
        ))
    } else {
        Arc::new(DisabledLedger)
    }
}

/// Used when `[ledger] enabled = false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLedger;

impl SuccessLedger for DisabledLedger {
    fn append_success(&self, cluster: &str, task: SuccessTask) -> Result<()> {
        debug!(cluster, run_id = %task.run_id, "success ledger disabled; not recording");
        Ok(())
    }
}
