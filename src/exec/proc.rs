//! Handle for a running plugin process.
//!
//! Owns the child and the read end of its combined output pipe. Both are
//! released on every path: `finish` closes and reaps, and dropping an
//! unfinished handle kills and reaps the child.

use super::ipc::PipeFd;
use super::signals::Termination;
use crate::error::{ProcmuxError, Result};
use chrono::{DateTime, Utc};
use nix::unistd::Pid;
use std::io::{self, Read};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::process::Child;

/// Result of a single non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were appended.
    Data(usize),
    /// Nothing available yet.
    WouldBlock,
    /// The write end is closed.
    Eof,
}

/// A spawned child with its output pipe.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    /// `None` once the pipe has been closed.
    reader: Option<PipeFd>,
    /// Raw descriptor of the pipe, kept as the active-set key.
    fd: RawFd,
    execution_start: DateTime<Utc>,
    reaped: bool,
}

impl RunningProcess {
    pub fn new(child: Child, reader: PipeFd, execution_start: DateTime<Utc>) -> Self {
        let fd = reader.as_raw_fd();
        Self {
            child,
            reader: Some(reader),
            fd,
            execution_start,
            reaped: false,
        }
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    /// Descriptor of the output pipe.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Borrow the output pipe, or `None` once it has been closed.
    pub fn output_fd(&self) -> Option<BorrowedFd<'_>> {
        self.reader.as_ref().map(AsFd::as_fd)
    }

    pub fn execution_start(&self) -> DateTime<Utc> {
        self.execution_start
    }

    /// Read at most `chunk_size` bytes and append them to `output`.
    pub fn read_chunk(&mut self, output: &mut Vec<u8>, chunk_size: usize) -> Result<ReadOutcome> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(ReadOutcome::Eof);
        };

        let start = output.len();
        output.resize(start + chunk_size, 0);

        let outcome = match reader.read(&mut output[start..]) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(ProcmuxError::Read {
                pid: self.child.id() as i32,
                source: e,
            }),
        };

        let appended = match outcome {
            Ok(ReadOutcome::Data(n)) => n,
            _ => 0,
        };
        output.truncate(start + appended);
        outcome
    }

    /// Close the pipe and reap the child (blocking).
    ///
    /// Returns how the child terminated and when it was launched.
    pub fn finish(&mut self) -> Result<(Termination, DateTime<Utc>)> {
        self.reader = None;
        let status = self.wait()?;
        Ok((status, self.execution_start))
    }

    fn wait(&mut self) -> Result<Termination> {
        if self.reaped {
            return Ok(Termination::Unknown);
        }
        let status = self.child.wait();
        // The pid is gone either way; nothing left to reap.
        self.reaped = true;
        status.map(Termination::from).map_err(|e| ProcmuxError::Wait {
            pid: self.child.id() as i32,
            source: e,
        })
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.reader = None;
        if !self.reaped {
            tracing::debug!(pid = self.child.id(), "Killing unfinished plugin process");
            let _ = self.child.kill();
            let _ = self.child.wait();
            self.reaped = true;
        }
    }
}
