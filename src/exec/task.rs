//! Task entities: the command to run, its running state, and its result.

use super::env::{ambient_environment, build_environment};
use super::proc::{ReadOutcome, RunningProcess};
use crate::error::{ProcmuxError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier assigned to every submission, unique per executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a launched task.
///
/// Queued tasks have no state of their own, and a task whose launch fails
/// goes straight to its failure completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Child process running, no output read yet.
    Spawned,
    /// Output is being read incrementally.
    Draining,
    /// EOF observed and child reaped.
    Completed,
}

/// An external command invocation waiting to be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTask {
    arguments: Vec<String>,
    environment: Vec<String>,
}

impl ProcessTask {
    /// Create a task that runs with the current process environment.
    pub fn new<I, S>(arguments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(arguments.into_iter().map(Into::into).collect(), None)
    }

    /// Create a task with extra environment variables layered on top of the
    /// current process environment.
    pub fn with_environment<I, S>(
        arguments: I,
        extra_environment: &BTreeMap<String, String>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(
            arguments.into_iter().map(Into::into).collect(),
            Some(extra_environment),
        )
    }

    /// Create a task that runs a command line through `sh -c`.
    pub fn shell(command: &str) -> Result<Self> {
        Self::new(parse_command(command))
    }

    fn build(
        arguments: Vec<String>,
        extra_environment: Option<&BTreeMap<String, String>>,
    ) -> Result<Self> {
        validate_arguments(&arguments)?;
        if let Some(extra) = extra_environment {
            validate_environment(extra)?;
        }

        Ok(Self {
            arguments,
            environment: build_environment(ambient_environment(), extra_environment),
        })
    }

    /// The executable path or name.
    pub fn program(&self) -> &str {
        &self.arguments[0]
    }

    /// The full argument vector, program first.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// The merged `KEY=VALUE` environment block.
    pub fn environment(&self) -> &[String] {
        &self.environment
    }
}

/// Turn a command line into an argument vector.
pub fn parse_command(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

fn validate_arguments(arguments: &[String]) -> Result<()> {
    if arguments.is_empty() {
        return Err(ProcmuxError::InvalidCommand(
            "argument vector is empty".to_string(),
        ));
    }
    if arguments[0].is_empty() {
        return Err(ProcmuxError::InvalidCommand(
            "program name is empty".to_string(),
        ));
    }
    if let Some(arg) = arguments.iter().find(|arg| arg.contains('\0')) {
        return Err(ProcmuxError::InvalidCommand(format!(
            "argument contains a NUL byte: {:?}",
            arg
        )));
    }
    Ok(())
}

fn validate_environment(extra: &BTreeMap<String, String>) -> Result<()> {
    for (key, value) in extra {
        let reason = if key.is_empty() {
            Some("name is empty")
        } else if key.contains('=') {
            Some("name contains '='")
        } else if key.contains('\0') || value.contains('\0') {
            Some("contains a NUL byte")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(ProcmuxError::InvalidEnvironment {
                key: key.clone(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

/// Final outcome of a plugin run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    /// Submission this result belongs to.
    pub task_id: TaskId,
    /// When the child was launched.
    pub execution_start: DateTime<Utc>,
    /// When the child was reaped.
    pub execution_end: DateTime<Utc>,
    /// Exit code; 128 means the status could not be determined.
    pub exit_code: u8,
    /// Combined stdout and stderr.
    pub output: String,
}

impl ProcessResult {
    /// Wall-clock time between launch and reap.
    pub fn duration(&self) -> chrono::Duration {
        self.execution_end - self.execution_start
    }

    /// Whether the plugin exited with code 0.
    pub fn is_ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// What a task's completion callback receives.
pub type Completion = std::result::Result<ProcessResult, ProcmuxError>;

/// Progress reported by one servicing step.
#[derive(Debug)]
pub enum Step {
    /// The task stays in the active set.
    More,
    /// EOF reached and the child reaped.
    Finished(ProcessResult),
}

/// A launched task owned by the worker loop.
#[derive(Debug)]
pub struct ActiveTask {
    id: TaskId,
    process: RunningProcess,
    output: Vec<u8>,
    state: TaskState,
}

impl ActiveTask {
    pub fn new(id: TaskId, process: RunningProcess) -> Self {
        Self {
            id,
            process,
            output: Vec::new(),
            state: TaskState::Spawned,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn process(&self) -> &RunningProcess {
        &self.process
    }

    /// Read one chunk of output; on EOF reap the child and build the result.
    ///
    /// The pipe is closed and the child reaped before `Finished` is returned.
    pub fn service(&mut self, chunk_size: usize) -> Result<Step> {
        match self.process.read_chunk(&mut self.output, chunk_size)? {
            ReadOutcome::Data(_) | ReadOutcome::WouldBlock => {
                self.state = TaskState::Draining;
                Ok(Step::More)
            }
            ReadOutcome::Eof => {
                let (termination, execution_start) = self.process.finish()?;
                let output = String::from_utf8_lossy(&std::mem::take(&mut self.output)).into_owned();
                let (exit_code, output) = termination.decode(output);
                self.state = TaskState::Completed;

                Ok(Step::Finished(ProcessResult {
                    task_id: self.id,
                    execution_start,
                    execution_end: Utc::now(),
                    exit_code,
                    output,
                }))
            }
        }
    }
}
