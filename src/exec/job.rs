// src/exec/job.rs

//! Caller-side description of a job.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::ExecutionOutcome;

/// Produces the argument list once the run directory is known.
pub type ArgsFn = Box<dyn Fn(&Path) -> Vec<String> + Send + Sync>;

/// Runs before the process is spawned, with the run directory. An error
/// aborts the run.
pub type PreExecHook = Box<dyn FnOnce(&Path) -> anyhow::Result<()> + Send>;

/// Runs after the process exits. The returned text is appended to the run
/// log; an error is appended as a diagnostic.
pub type PostExecHook = Box<dyn FnOnce(&ExecutionOutcome) -> anyhow::Result<String> + Send>;

/// Placeholder replaced by the run directory in templated arguments.
pub const RUN_DIR_PLACEHOLDER: &str = "{run_dir}";

/// What to run, where, and against which cluster.
pub struct JobSpec {
    cluster: String,
    job_type: String,
    program: String,
    args: ArgsFn,
    dir: PathBuf,
    env: Vec<String>,
    pre_exec: Option<PreExecHook>,
    post_exec: Option<PostExecHook>,
}

impl JobSpec {
    pub fn new(
        cluster: impl Into<String>,
        job_type: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            job_type: job_type.into(),
            program: program.into(),
            args: Box::new(|_| Vec::new()),
            dir: PathBuf::from("."),
            env: Vec::new(),
            pre_exec: None,
            post_exec: None,
        }
    }

    pub fn with_args<F>(mut self, args: F) -> Self
    where
        F: Fn(&Path) -> Vec<String> + Send + Sync + 'static,
    {
        self.args = Box::new(args);
        self
    }

    /// Arguments where every `{run_dir}` is replaced by the run directory.
    pub fn with_templated_args<I, S>(self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        self.with_args(move |run_dir| {
            let run_dir = run_dir.display().to_string();
            templates
                .iter()
                .map(|t| t.replace(RUN_DIR_PLACEHOLDER, &run_dir))
                .collect()
        })
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Add one `KEY=VALUE` entry.
    ///
    /// With no entries the process inherits this process's environment; with
    /// any entries it sees exactly those.
    pub fn with_env(mut self, var: impl Into<String>) -> Self {
        self.env.push(var.into());
        self
    }

    pub fn with_pre_exec<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Path) -> anyhow::Result<()> + Send + 'static,
    {
        self.pre_exec = Some(Box::new(hook));
        self
    }

    pub fn with_post_exec<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&ExecutionOutcome) -> anyhow::Result<String> + Send + 'static,
    {
        self.post_exec = Some(Box::new(hook));
        self
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    pub fn materialize_args(&self, run_dir: &Path) -> Vec<String> {
        (self.args)(run_dir)
    }

    pub(crate) fn take_pre_exec(&mut self) -> Option<PreExecHook> {
        self.pre_exec.take()
    }

    pub(crate) fn take_post_exec(&mut self) -> Option<PostExecHook> {
        self.post_exec.take()
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("cluster", &self.cluster)
            .field("job_type", &self.job_type)
            .field("program", &self.program)
            .field("dir", &self.dir)
            .field("env", &self.env)
            .field("pre_exec", &self.pre_exec.is_some())
            .field("post_exec", &self.post_exec.is_some())
            .finish()
    }
}
