// src/exec/coordinator.rs

//! Launch-and-observe orchestration for one job.
//!
//! A call to [`Coordinator::exec`] moves through these phases:
//!
//! 1. lock the cluster (fails fast if another job holds it),
//! 2. create the run directory and run the pre-exec hook,
//! 3. open `command.log` and spawn the process with stdout/stderr redirected,
//! 4. hand the run id back to the caller: `exec` returns here,
//! 5. in the background, wait for the process, parse its recap, run the
//!    post-exec hook and record a success in the ledger,
//! 6. release the lock.
//!
//! Errors in steps 1-3 are returned from `exec`. Errors after that are written
//! to the run log and traced; the caller has already moved on.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use chrono::Local;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::errors::{ExecError, PostRunError};
use crate::exec::job::{JobSpec, PostExecHook};
use crate::exec::run_log::{POST_EXEC_DIVIDER, RunLog};
use crate::history::{HistoryStore, RunDir, RunRecord, validate_job_type};
use crate::ledger::{SuccessLedger, SuccessTask};
use crate::lock::{ClusterLock, ClusterLocks};
use crate::recap::RecapParser;
use crate::types::ExecutionOutcome;

/// What the background task reports once the process is running.
#[derive(Debug)]
struct StartedRun {
    run_id: String,
    run_dir: PathBuf,
}

type StartResult = Result<StartedRun, ExecError>;

/// A started run. Dropping it leaves the run going in the background.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    run_dir: PathBuf,
    finished: JoinHandle<Option<ExecutionOutcome>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join(crate::history::COMMAND_LOG)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_finished()
    }

    /// Wait until the process has exited and post-processing is done.
    ///
    /// Resolves to `None` when no post-exec hook was registered, since the
    /// recap is only evaluated for hooked runs.
    pub async fn wait(self) -> Option<ExecutionOutcome> {
        match self.finished.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "run task did not complete");
                None
            }
        }
    }
}

struct Shared {
    history: HistoryStore,
    locks: ClusterLocks,
    recap: RecapParser,
    ledger: Arc<dyn SuccessLedger>,
}

/// Runs jobs against clusters, one at a time per cluster.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(
        history: HistoryStore,
        locks: ClusterLocks,
        recap: RecapParser,
        ledger: Arc<dyn SuccessLedger>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                history,
                locks,
                recap,
                ledger,
            }),
        }
    }

    pub fn from_config(cfg: &ConfigFile, ledger: Arc<dyn SuccessLedger>) -> Self {
        Self::new(
            HistoryStore::new(cfg.data_dir()),
            ClusterLocks::new(cfg.lock_dir()),
            cfg.recap_parser(),
            ledger,
        )
    }

    pub fn history(&self) -> &HistoryStore {
        &self.shared.history
    }

    pub fn locks(&self) -> &ClusterLocks {
        &self.shared.locks
    }

    /// Start `job` and return as soon as its process is running.
    ///
    /// The returned error is the first thing that went wrong before the
    /// process started; nothing is left running in that case and the cluster
    /// lock has been released.
    pub async fn exec(&self, job: JobSpec) -> Result<RunHandle, ExecError> {
        info!(
            cluster = %job.cluster(),
            job_type = %job.job_type(),
            program = %job.program(),
            "executing job"
        );

        validate_job_type(job.job_type())?;

        let (started_tx, started_rx) = oneshot::channel::<StartResult>();
        let shared = Arc::clone(&self.shared);
        let finished = tokio::spawn(drive_run(shared, job, started_tx));

        match started_rx.await {
            Ok(Ok(started)) => Ok(RunHandle {
                run_id: started.run_id,
                run_dir: started.run_dir,
                finished,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ExecError::Aborted),
        }
    }
}

/// Body of the background task. Owns the cluster lock for its whole life.
async fn drive_run(
    shared: Arc<Shared>,
    job: JobSpec,
    started_tx: oneshot::Sender<StartResult>,
) -> Option<ExecutionOutcome> {
    let mut lock = match shared.locks.acquire(job.cluster()) {
        Ok(lock) => lock,
        Err(err) => {
            warn!(cluster = %job.cluster(), error = %err, "could not lock cluster");
            let _ = started_tx.send(Err(err.into()));
            return None;
        }
    };

    // Directory setup and the caller's pre-exec hook may block.
    let cluster = job.cluster().to_string();
    let prepare_shared = Arc::clone(&shared);
    let prepared = task::spawn_blocking(move || {
        let mut job = job;
        let result = prepare(&prepare_shared, &mut job);
        (job, result)
    })
    .await;

    let (job, prepared) = match prepared {
        Ok((job, Ok(prepared))) => (job, prepared),
        Ok((_, Err(err))) => {
            warn!(cluster = %cluster, error = %err, "job failed to start");
            let _ = started_tx.send(Err(err));
            return None;
        }
        Err(e) => {
            error!(cluster = %cluster, error = %e, "preparing the run did not complete");
            let _ = started_tx.send(Err(ExecError::Aborted));
            return None;
        }
    };

    let launched = match launch(&shared, &job, prepared, &mut lock) {
        Ok(launched) => launched,
        Err(err) => {
            warn!(cluster = %cluster, error = %err, "job failed to start");
            let _ = started_tx.send(Err(err));
            return None;
        }
    };

    let started = StartedRun {
        run_id: launched.run.run_id.clone(),
        run_dir: launched.run.path.clone(),
    };
    if started_tx.send(Ok(started)).is_err() {
        debug!(
            run_id = %launched.run.run_id,
            "caller stopped waiting; run continues detached"
        );
    }

    let outcome = finish(&shared, job, launched).await;
    lock.release();
    outcome
}

/// A run directory with its log, ready for the process to be spawned.
struct PreparedRun {
    run: RunDir,
    log: RunLog,
}

struct LaunchedRun {
    run: RunDir,
    child: Child,
    log: RunLog,
}

/// Create the run directory, run the pre-exec hook and open the log.
fn prepare(shared: &Shared, job: &mut JobSpec) -> Result<PreparedRun, ExecError> {
    let run = shared.history.prepare_run_dir(job.cluster(), job.job_type())?;

    if let Some(pre_exec) = job.take_pre_exec() {
        debug!(run_id = %run.run_id, "running pre-exec hook");
        pre_exec(&run.path).map_err(ExecError::PreHook)?;
    }

    let log_path = run.log_path();
    let log = RunLog::create(&log_path).map_err(|source| ExecError::Setup {
        what: "log file",
        path: log_path.clone(),
        source,
    })?;

    Ok(PreparedRun { run, log })
}

fn launch(
    shared: &Shared,
    job: &JobSpec,
    prepared: PreparedRun,
    lock: &mut ClusterLock,
) -> Result<LaunchedRun, ExecError> {
    let PreparedRun { run, log } = prepared;

    let (stdout, stderr) = log.child_stdio().map_err(|source| ExecError::Setup {
        what: "log file",
        path: log.path().to_path_buf(),
        source,
    })?;

    let record = RunRecord::for_job(job, &run);
    let mut cmd = Command::new(&record.program);
    cmd.args(&record.args)
        .current_dir(job.dir())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    apply_env(&mut cmd, job.env());

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            drop(log);
            if let Err(e) = shared.history.discard_run_dir(&run) {
                warn!(
                    path = %run.path.display(),
                    error = %e,
                    "failed to remove run directory of unstarted job"
                );
            }
            return Err(ExecError::Spawn {
                command: record.command_string(),
                source,
            });
        }
    };

    info!(
        cluster = %record.cluster,
        run_id = %run.run_id,
        pid = ?child.id(),
        command = %record.command_string(),
        "started command"
    );

    // The process is running from here on: nothing below may abort the run.
    if let Err(e) = shared.history.persist_record(&record) {
        warn!(run_id = %run.run_id, error = %format!("{e:#}"), "failed to persist run record");
    }
    if let Err(e) = lock.record_run(&run.run_id) {
        warn!(run_id = %run.run_id, error = %e, "failed to write run id into lock file");
    }

    Ok(LaunchedRun { run, child, log })
}

/// Empty means inherit; otherwise the list is the complete environment.
fn apply_env(cmd: &mut Command, env: &[String]) {
    if env.is_empty() {
        return;
    }
    cmd.env_clear();
    for entry in env {
        match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                cmd.env(key, value);
            }
            _ => warn!(entry = %entry, "ignoring environment entry not of the form KEY=VALUE"),
        }
    }
}

async fn finish(
    shared: &Arc<Shared>,
    mut job: JobSpec,
    launched: LaunchedRun,
) -> Option<ExecutionOutcome> {
    let LaunchedRun {
        run,
        mut child,
        log,
    } = launched;

    let exit_code = match child.wait().await {
        Ok(status) => {
            info!(
                run_id = %run.run_id,
                exit_code = ?status.code(),
                success = status.success(),
                "command exited"
            );
            status.code()
        }
        Err(e) => {
            error!(run_id = %run.run_id, error = %e, "failed waiting for command");
            None
        }
    };

    let Some(post_exec) = job.take_post_exec() else {
        debug!(run_id = %run.run_id, "no post-exec hook registered; skipping recap");
        return None;
    };

    // Reading the log, the caller's hook and the ledger may all block.
    let run_id = run.run_id.clone();
    let shared = Arc::clone(shared);
    let processed = task::spawn_blocking(move || {
        let mut log = log;
        post_process(&shared, &job, &run, &mut log, exit_code, post_exec)
    })
    .await;

    match processed {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(run_id = %run_id, error = %e, "post-processing did not complete");
            None
        }
    }
}

fn post_process(
    shared: &Shared,
    job: &JobSpec,
    run: &RunDir,
    log: &mut RunLog,
    exit_code: Option<i32>,
    post_exec: PostExecHook,
) -> ExecutionOutcome {
    if let Err(e) = log.append(POST_EXEC_DIVIDER) {
        report_post_run_error(log, run, &PostRunError::Log(e));
    }

    let outcome = match read_outcome(&shared.recap, log, run, exit_code) {
        Ok(outcome) => outcome,
        Err(err) => {
            report_post_run_error(log, run, &err);
            ExecutionOutcome {
                success: false,
                nodes: Vec::new(),
                run_id: run.run_id.clone(),
                run_dir: run.path.clone(),
                exit_code,
            }
        }
    };

    info!(
        run_id = %run.run_id,
        success = outcome.success,
        nodes = outcome.nodes.len(),
        "evaluated run outcome"
    );

    match post_exec(&outcome) {
        Ok(message) => {
            if let Err(e) = log.append(&message) {
                report_post_run_error(log, run, &PostRunError::Log(e));
            }
        }
        Err(e) => report_post_run_error(log, run, &PostRunError::Hook(e)),
    }

    if outcome.success {
        let task = SuccessTask {
            job_type: job.job_type().to_string(),
            timestamp: Local::now(),
            run_id: run.run_id.clone(),
        };
        if let Err(e) = shared.ledger.append_success(job.cluster(), task) {
            report_post_run_error(log, run, &PostRunError::Ledger(e));
        }
    }

    outcome
}

fn read_outcome(
    recap: &RecapParser,
    log: &RunLog,
    run: &RunDir,
    exit_code: Option<i32>,
) -> Result<ExecutionOutcome, PostRunError> {
    let output = log.read_all()?;
    let summary = recap.parse(&output)?;
    Ok(ExecutionOutcome {
        success: summary.success,
        nodes: summary.nodes,
        run_id: run.run_id.clone(),
        run_dir: run.path.clone(),
        exit_code,
    })
}

fn report_post_run_error(log: &mut RunLog, run: &RunDir, err: &PostRunError) {
    warn!(run_id = %run.run_id, error = %err, "post-run step failed");
    if let Err(e) = log.append(&format!("Error in {err}\n")) {
        warn!(run_id = %run.run_id, error = %e, "failed to append diagnostic to run log");
    }
}
