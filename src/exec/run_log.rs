// src/exec/run_log.rs

//! The per-run `command.log`.
//!
//! The child process gets duplicated handles for stdout and stderr, so both
//! streams land in the same file in the order they were written. After the
//! child exits, the coordinator appends its own diagnostics to the same file.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::warn;

/// Written between the tool's output and the coordinator's post-run notes.
pub const POST_EXEC_DIVIDER: &str =
    "\n\n\nCLUSTER EXEC *******************************************************************\n";

/// Open log file for one run. Synced on drop.
#[derive(Debug)]
pub struct RunLog {
    file: File,
    path: PathBuf,
}

impl RunLog {
    /// Create the log, truncating any previous content.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handles for the child's stdout and stderr.
    pub fn child_stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let stdout = self.file.try_clone()?;
        let stderr = self.file.try_clone()?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    pub fn append(&mut self, text: &str) -> io::Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(text.as_bytes())
    }

    /// Whole log as text. Invalid UTF-8 from the tool is replaced, not fatal.
    pub fn read_all(&self) -> io::Result<String> {
        let bytes = fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            warn!(path = %self.path.display(), error = %e, "failed to sync run log");
        }
    }
}
