//! Plugin process launching.
//!
//! Uses `posix_spawn`/`fork+exec` via `std::process::Command`, which reports
//! exec failures back to the parent instead of leaving a half-started child.
//! Stdout and stderr share one pipe so the parent sees the combined output in
//! the order the child wrote it.

use super::env::split_entry;
use super::ipc::{cloexec_pipe, set_nonblocking};
use super::proc::RunningProcess;
use super::task::ProcessTask;
use crate::error::{ProcmuxError, Result};
use chrono::Utc;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Spawn the task's command with its output wired to a fresh pipe.
///
/// On success the parent holds only the non-blocking read end; the write end
/// lives in the child. On failure every descriptor opened here is closed
/// before the error is returned.
pub fn launch(task: &ProcessTask) -> Result<RunningProcess> {
    let execution_start = Utc::now();

    let (reader, writer) = cloexec_pipe()?;
    set_nonblocking(&reader)?;

    let stdout = writer.into_owned();
    let stderr = stdout.try_clone()?;

    let mut cmd = Command::new(task.program());
    cmd.args(&task.arguments()[1..]);

    cmd.env_clear();
    for entry in task.environment() {
        match split_entry(entry) {
            Some((key, value)) => {
                cmd.env(key, value);
            }
            None => trace!(entry = %entry, "Skipping malformed environment entry"),
        }
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(stdout));
    cmd.stderr(Stdio::from(stderr));

    // `cmd` owns both write ends and closes them when dropped at the end of
    // this function, on success and on failure alike.
    let child = cmd.spawn().map_err(|e| ProcmuxError::Spawn {
        program: task.program().to_string(),
        source: e,
    })?;

    debug!(
        pid = child.id(),
        program = %task.program(),
        args = task.arguments().len() - 1,
        "Spawned plugin process"
    );

    Ok(RunningProcess::new(child, reader, execution_start))
}
