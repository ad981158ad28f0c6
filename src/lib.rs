// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod history;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod recap;
pub mod types;

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::{CliArgs, CliCommand, RunArgs};
use crate::config::{ConfigFile, load_or_default};
use crate::exec::{Coordinator, JobSpec};
use crate::history::HistoryStore;
use crate::ledger::{FileSuccessLedger, ledger_from_config};
use crate::lock::ClusterLocks;
use crate::types::ExecutionOutcome;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the coordinator and its success ledger
/// - the `run` / `status` / `history` subcommands
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(args.config.as_deref())?;

    match args.command {
        CliCommand::Run(run_args) => run_job(&cfg, run_args).await,
        CliCommand::Status { cluster } => print_status(&cfg, &cluster),
        CliCommand::History { cluster } => print_history(&cfg, &cluster),
    }
}

async fn run_job(cfg: &ConfigFile, args: RunArgs) -> Result<()> {
    let coordinator = Coordinator::from_config(cfg, ledger_from_config(cfg));

    let (program, rest) = args
        .command
        .split_first()
        .context("no command given to run")?;

    let mut job = JobSpec::new(&args.cluster, &args.job_type, program)
        .with_templated_args(rest.to_vec())
        .with_dir(&args.dir);
    for var in args.env {
        job = job.with_env(var);
    }
    if !args.no_recap {
        job = job.with_post_exec(|outcome| Ok(render_outcome(outcome)));
    }

    let handle = coordinator.exec(job).await?;

    // The run id goes to stdout as soon as the job is running.
    println!("{}", handle.run_id());
    info!(log = %handle.log_path().display(), "job started; waiting for it to finish");

    let run_id = handle.run_id().to_string();
    match handle.wait().await {
        Some(outcome) => {
            print!("{}", render_outcome(&outcome));
            if !outcome.success {
                bail!("run {run_id} on cluster '{}' did not succeed", args.cluster);
            }
        }
        None => println!("run {run_id} finished (recap not evaluated)"),
    }
    Ok(())
}

fn print_status(cfg: &ConfigFile, cluster: &str) -> Result<()> {
    let status = ClusterLocks::new(cfg.lock_dir()).inspect(cluster)?;
    match status.run_id {
        Some(run_id) => println!("{cluster}: busy (run {run_id})"),
        None => println!("{cluster}: idle"),
    }
    Ok(())
}

fn print_history(cfg: &ConfigFile, cluster: &str) -> Result<()> {
    let runs = HistoryStore::new(cfg.data_dir())
        .list_runs(cluster)
        .with_context(|| format!("listing history of cluster '{cluster}'"))?;
    let successes = if cfg.ledger.enabled {
        FileSuccessLedger::new(cfg.data_dir(), cfg.ledger.file_name.clone()).successes(cluster)?
    } else {
        Vec::new()
    };

    println!("runs ({}):", runs.len());
    for run_id in runs {
        match successes.iter().find(|task| task.run_id == run_id) {
            Some(task) => println!("  - {run_id}  succeeded at {}", task.timestamp.to_rfc3339()),
            None => println!("  - {run_id}"),
        }
    }
    Ok(())
}

/// Human-readable verdict, also appended to the run log by the CLI's hook.
pub fn render_outcome(outcome: &ExecutionOutcome) -> String {
    let mut out = String::new();
    for node in &outcome.nodes {
        let _ = writeln!(
            out,
            "{}: ok={} changed={} unreachable={} failed={}",
            node.node, node.ok, node.changed, node.unreachable, node.failed
        );
    }
    let verdict = if outcome.success { "success" } else { "failure" };
    let _ = writeln!(out, "run {}: {verdict}", outcome.run_id);
    out
}
