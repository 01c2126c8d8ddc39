//! Readiness waiting for the worker loop.
//!
//! `Readiness` answers "which of these descriptors can be read now", bounded
//! by a timeout. `PollReadiness` uses `poll(2)`. `SleepReadiness` is the
//! fallback for platforms without a usable readiness primitive: it sleeps for
//! a short fixed interval and reports every source as ready, relying on the
//! descriptors being non-blocking.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use serde::Serialize;
use std::io;
use std::os::unix::io::BorrowedFd;
use std::str::FromStr;
use std::time::Duration;

/// Which readiness strategy the worker loop uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessMode {
    /// Native `poll(2)`.
    #[default]
    Poll,
    /// Fixed sleep, every source treated as ready.
    Sleep,
}

impl FromStr for ReadinessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "sleep" => Ok(Self::Sleep),
            _ => Err(format!(
                "Unknown readiness mode: '{}'. Valid options: poll, sleep",
                s
            )),
        }
    }
}

impl std::fmt::Display for ReadinessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Sleep => write!(f, "sleep"),
        }
    }
}

/// Per-source readiness, in the order the sources were passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySet {
    ready: Vec<bool>,
}

impl ReadySet {
    pub fn all(len: usize) -> Self {
        Self {
            ready: vec![true; len],
        }
    }

    pub fn none(len: usize) -> Self {
        Self {
            ready: vec![false; len],
        }
    }

    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.ready.iter().filter(|r| **r).count()
    }
}

/// Wait until any source is readable or the timeout elapses.
pub trait Readiness: Send {
    fn wait(&mut self, sources: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<ReadySet>;
}

/// Readiness backed by `poll(2)`.
#[derive(Debug, Default)]
pub struct PollReadiness;

impl Readiness for PollReadiness {
    fn wait(&mut self, sources: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<ReadySet> {
        let mut fds: Vec<PollFd<'_>> = sources
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
            .collect();

        let millis = timeout.as_millis().min(u16::MAX as u128) as u16;
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(ReadySet::none(sources.len())),
            Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
        }

        // Hang-up and error count as readable: the next read reports EOF or
        // the error itself.
        let interesting = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        let ready = fds
            .iter()
            .map(|fd| fd.revents().is_some_and(|r| r.intersects(interesting)))
            .collect();
        Ok(ReadySet { ready })
    }
}

/// Readiness fallback that sleeps and then reports everything ready.
#[derive(Debug)]
pub struct SleepReadiness {
    interval: Duration,
}

impl SleepReadiness {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Readiness for SleepReadiness {
    fn wait(&mut self, sources: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<ReadySet> {
        std::thread::sleep(self.interval.min(timeout));
        Ok(ReadySet::all(sources.len()))
    }
}

/// Build the readiness strategy for a mode.
pub fn for_mode(mode: ReadinessMode, fallback_interval: Duration) -> Box<dyn Readiness> {
    match mode {
        ReadinessMode::Poll => Box::new(PollReadiness),
        ReadinessMode::Sleep => Box::new(SleepReadiness::new(fallback_interval)),
    }
}
