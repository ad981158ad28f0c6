use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use cluster_exec::ledger::{SuccessLedger, SuccessTask};

/// A ledger whose appends always fail, counting how often it was asked.
#[derive(Debug, Default)]
pub struct FailingLedger {
    attempts: AtomicUsize,
}

impl FailingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SuccessLedger for FailingLedger {
    fn append_success(&self, cluster: &str, task: SuccessTask) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!(
            "ledger unavailable for cluster '{cluster}' (run {})",
            task.run_id
        ))
    }
}
