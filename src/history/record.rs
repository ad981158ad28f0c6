// src/history/record.rs

//! The write-once description of a launched run.

use std::path::PathBuf;

use serde::Serialize;

use crate::exec::JobSpec;
use crate::history::RunDir;

/// Everything needed to reproduce a run by hand, captured at launch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub cluster: String,
    pub program: String,
    pub dir: PathBuf,
    /// Arguments after substitution of the run directory.
    pub args: Vec<String>,
    pub env: Vec<String>,
}

/// Layout of `command.yaml`.
#[derive(Serialize)]
struct RunDescriptor<'a> {
    cluster: &'a str,
    history: String,
    pid: &'a str,
    dir: String,
    cmd: &'a str,
    args: &'a [String],
    env: &'a [String],
    shell: String,
}

impl RunRecord {
    pub fn for_job(job: &JobSpec, run: &RunDir) -> Self {
        Self {
            run_id: run.run_id.clone(),
            run_dir: run.path.clone(),
            cluster: job.cluster().to_string(),
            program: job.program().to_string(),
            dir: job.dir().to_path_buf(),
            args: job.materialize_args(&run.path),
            env: job.env().to_vec(),
        }
    }

    /// The invoked command as a single line: program followed by arguments.
    pub fn command_string(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Equivalent shell invocation with the environment exported up front.
    pub fn shell_line(&self) -> String {
        let mut line = format!("cd {}", self.dir.display());
        for var in &self.env {
            line.push_str(&format!(" && export \"{var}\""));
        }
        line.push_str(" && ");
        line.push_str(&self.command_string());
        line
    }

    /// Render the YAML descriptor written to `command.yaml`.
    pub fn descriptor(&self) -> Result<String, serde_yaml::Error> {
        let descriptor = RunDescriptor {
            cluster: &self.cluster,
            history: self.run_dir.display().to_string(),
            pid: &self.run_id,
            dir: self.dir.display().to_string(),
            cmd: &self.program,
            args: &self.args,
            env: &self.env,
            shell: self.shell_line(),
        };
        serde_yaml::to_string(&descriptor)
    }
}
