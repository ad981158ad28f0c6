// src/lock.rs

//! Per-cluster exclusive lock backed by a marker file.
//!
//! The lock is an advisory, non-blocking exclusive file lock (`flock` on
//! Unix) on `<lock_dir>/<cluster>.lock`. Because the kernel owns the lock
//! state, it is valid across coordinator instances and process restarts: a
//! crashed holder releases it when its file descriptor is closed.
//!
//! While a job runs, the marker file contains the active run id so external
//! tooling can see who holds the cluster (see [`ClusterLocks::inspect`]).

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::LockError;

/// Factory for cluster locks rooted at a single directory.
#[derive(Debug, Clone)]
pub struct ClusterLocks {
    lock_dir: PathBuf,
}

/// Snapshot of a cluster's lock as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub held: bool,
    /// Run id written by the holder, if any.
    pub run_id: Option<String>,
}

impl ClusterLocks {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    pub fn lock_path(&self, cluster: &str) -> PathBuf {
        self.lock_dir.join(format!("{cluster}.lock"))
    }

    /// Take the lock for `cluster` without waiting.
    ///
    /// Returns [`LockError::Busy`] immediately if any holder (in this or
    /// another process) has it.
    pub fn acquire(&self, cluster: &str) -> Result<ClusterLock, LockError> {
        validate_cluster_name(cluster)?;
        let path = self.lock_path(cluster);
        let io_err = |source: io::Error| LockError::Io {
            cluster: cluster.to_string(),
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.lock_dir).map_err(io_err)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        match try_lock_exclusive(&file) {
            Ok(true) => {
                // A crashed holder may have left its run id behind.
                if let Err(e) = file.set_len(0) {
                    warn!(cluster, error = %e, "failed to clear stale cluster lock marker");
                }
                info!(cluster, path = %path.display(), "acquired cluster lock");
                Ok(ClusterLock {
                    file,
                    cluster: cluster.to_string(),
                    path,
                })
            }
            Ok(false) => {
                debug!(cluster, "cluster lock is held elsewhere");
                Err(LockError::Busy {
                    cluster: cluster.to_string(),
                })
            }
            Err(e) => Err(io_err(e)),
        }
    }

    /// Read the marker file without touching the lock itself.
    ///
    /// Only the holder writes the marker and it is cleared on release, so a
    /// recorded run id means the cluster is busy. A holder that has not yet
    /// recorded its run reads as idle, and a holder that crashed leaves its
    /// run id behind until the cluster is next acquired.
    pub fn inspect(&self, cluster: &str) -> Result<LockStatus, LockError> {
        validate_cluster_name(cluster)?;
        let path = self.lock_path(cluster);

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(LockError::Io {
                    cluster: cluster.to_string(),
                    path,
                    source,
                });
            }
        };
        let run_id = Some(contents.trim().to_string()).filter(|s| !s.is_empty());

        Ok(LockStatus {
            held: run_id.is_some(),
            run_id,
        })
    }
}

/// A held cluster lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ClusterLock {
    file: File,
    cluster: String,
    path: PathBuf,
}

impl ClusterLock {
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the marker content with the active run id.
    pub fn record_run(&mut self, run_id: &str) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(run_id.as_bytes())?;
        self.file.sync_data()
    }

    /// Release explicitly. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        // Clear the run id while still holding the lock so observers never
        // see a finished run reported as active.
        if let Err(e) = self.file.set_len(0) {
            warn!(
                cluster = %self.cluster,
                error = %e,
                "failed to clear cluster lock marker"
            );
        }
        if let Err(e) = self.file.unlock() {
            warn!(cluster = %self.cluster, error = %e, "failed to unlock cluster lock");
        }
        info!(cluster = %self.cluster, "released cluster lock");
    }
}

/// Reject names that would escape the lock or history directories.
pub fn validate_cluster_name(cluster: &str) -> Result<(), LockError> {
    if !is_plain_name(cluster) {
        return Err(LockError::InvalidCluster(cluster.to_string()));
    }
    Ok(())
}

/// True if `name` can be used as a single path component.
pub(crate) fn is_plain_name(name: &str) -> bool {
    !(name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']))
}

/// Try to take an exclusive lock without blocking.
///
/// `Ok(false)` means another open file description holds it.
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(e)) => Err(e),
    }
}
