//! Output formatting for plugin run records.

pub mod json;
pub mod plain;

use crate::exec::{Completion, TaskId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated text (default).
    #[default]
    Plain,
    /// JSON array.
    Json,
}

/// One command line and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub exit_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub output: String,
    /// Set when the task never produced a result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    /// Build a record from a task completion.
    ///
    /// Errors are reported with the sentinel exit code.
    pub fn from_completion(command: impl Into<String>, completion: &Completion) -> Self {
        let command = command.into();
        match completion {
            Ok(result) => Self {
                command,
                task_id: Some(result.task_id),
                exit_code: result.exit_code,
                started_at: Some(result.execution_start),
                duration_ms: result.duration().num_milliseconds(),
                output: result.output.clone(),
                error: None,
            },
            Err(e) => Self::failed(command, e.to_string()),
        }
    }

    /// Record for a command that was rejected before it ran.
    pub fn failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            task_id: None,
            exit_code: crate::exec::SENTINEL_EXIT_CODE,
            started_at: None,
            duration_ms: 0,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Write records in the chosen format.
pub fn write_records<W: Write>(
    out: &mut W,
    records: &[RunRecord],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => plain::write_plain(out, records),
        OutputFormat::Json => json::write_json(out, records),
    }
}

/// Format and print records to stdout.
pub fn print_records(records: &[RunRecord], format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_records(&mut out, records, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcmuxError;
    use crate::exec::ProcessResult;

    #[test]
    fn test_record_from_result() {
        let start = Utc::now();
        let completion: Completion = Ok(ProcessResult {
            task_id: TaskId(4),
            execution_start: start,
            execution_end: start + chrono::Duration::milliseconds(30),
            exit_code: 1,
            output: "WARNING - load 7.1\n".to_string(),
        });

        let record = RunRecord::from_completion("check_load", &completion);
        assert_eq!(record.task_id, Some(TaskId(4)));
        assert_eq!(record.exit_code, 1);
        assert_eq!(record.duration_ms, 30);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_record_from_error() {
        let completion: Completion = Err(ProcmuxError::ShutDown);
        let record = RunRecord::from_completion("check_disk", &completion);
        assert_eq!(record.exit_code, 128);
        assert_eq!(record.error.as_deref(), Some("Executor is shut down"));
    }
}
