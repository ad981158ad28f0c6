#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cluster_exec::config::{ConfigFile, RawConfigFile};
use cluster_exec::exec::{Coordinator, JobSpec};
use cluster_exec::history::HistoryStore;
use cluster_exec::ledger::{MemorySuccessLedger, SuccessLedger};
use cluster_exec::lock::ClusterLocks;
use cluster_exec::recap::DEFAULT_RECAP_BANNER;
use tempfile::TempDir;

/// An isolated data/lock directory with a coordinator wired to it.
pub struct TestEnv {
    pub root: TempDir,
    pub config: ConfigFile,
    pub ledger: Arc<MemorySuccessLedger>,
    pub coordinator: Coordinator,
}

impl TestEnv {
    pub fn new() -> Self {
        let ledger = Arc::new(MemorySuccessLedger::new());
        Self::build(Arc::clone(&ledger) as Arc<dyn SuccessLedger>, ledger)
    }

    /// Same layout, but the coordinator appends to `ledger` instead.
    pub fn with_ledger(ledger: Arc<dyn SuccessLedger>) -> Self {
        Self::build(ledger, Arc::new(MemorySuccessLedger::new()))
    }

    fn build(active: Arc<dyn SuccessLedger>, memory: Arc<MemorySuccessLedger>) -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let mut raw = RawConfigFile::default();
        raw.paths.data_dir = root.path().join("data");
        raw.paths.lock_dir = Some(root.path().join("locks"));
        let config = ConfigFile::try_from(raw).expect("valid test config");
        let coordinator = Coordinator::from_config(&config, active);

        Self {
            root,
            config,
            ledger: memory,
            coordinator,
        }
    }

    pub fn locks(&self) -> ClusterLocks {
        ClusterLocks::new(self.config.lock_dir())
    }

    pub fn history(&self) -> HistoryStore {
        HistoryStore::new(self.config.data_dir())
    }

    /// Write a file outside the data directory, e.g. canned tool output.
    pub fn write_fixture(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool output ending with a recap block made of `node_lines`.
pub fn recap_output(node_lines: &[&str]) -> String {
    let mut out = String::from("PLAY [all] *****\n\nTASK [ping] *****\nok: [node]\n\n");
    out.push_str(DEFAULT_RECAP_BANNER);
    out.push('\n');
    for line in node_lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// A job that runs `script` with `/bin/sh -c`.
pub fn shell_job(cluster: &str, job_type: &str, script: &str) -> JobSpec {
    let script = script.to_string();
    JobSpec::new(cluster, job_type, "/bin/sh")
        .with_args(move |_| vec!["-c".to_string(), script.clone()])
}

/// A job that prints the contents of `fixture` after `delay_secs`.
pub fn replay_job(cluster: &str, job_type: &str, fixture: &Path, delay_secs: u32) -> JobSpec {
    let script = if delay_secs == 0 {
        format!("cat '{}'", fixture.display())
    } else {
        format!("sleep {delay_secs}; cat '{}'", fixture.display())
    };
    shell_job(cluster, job_type, &script)
}
