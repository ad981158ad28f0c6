use std::path::PathBuf;

use serde::Serialize;

/// Per-node counters from the tool's recap section.
///
/// Values are kept exactly as printed. A key the tool did not print is the
/// empty string, which callers must read as "unknown", not as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub node: String,
    pub ok: String,
    pub changed: String,
    pub unreachable: String,
    pub failed: String,
    pub skipped: String,
    pub rescued: String,
    pub ignored: String,
}

impl NodeStatus {
    /// A node is healthy only if both counters are literally `"0"`.
    pub fn is_healthy(&self) -> bool {
        self.unreachable == "0" && self.failed == "0"
    }
}

/// Verdict for one completed run, handed to the post-exec hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub nodes: Vec<NodeStatus>,
    pub run_id: String,
    pub run_dir: PathBuf,
    /// Exit code of the external process, `None` if it was killed by a signal
    /// or its status could not be collected.
    pub exit_code: Option<i32>,
}
