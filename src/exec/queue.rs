//! Task hand-off between submitting threads and the worker loop.
//!
//! `TaskQueue` is a mutex-guarded FIFO. The wakeup channel is a self-pipe:
//! submitters write one byte to the write end, and the worker includes the
//! read end in its readiness set so a blocked poll returns promptly.

use super::ipc::{PipeFd, cloexec_pipe, set_nonblocking};
use crate::error::Result;
use nix::errno::Errno;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::os::unix::io::{AsFd, BorrowedFd};
use std::sync::{Mutex, MutexGuard};

struct QueueState<T> {
    pending: VecDeque<T>,
    closed: bool,
}

/// FIFO of pending work shared between threads.
///
/// The lock is held only for a single push or pop.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item. Hands the item back if the queue has been closed.
    pub fn push(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.pending.push_back(item);
        Ok(())
    }

    /// Remove the oldest item. Returns `None` when empty or closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.pending.pop_front()
    }

    /// Refuse further pushes and pops.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Take everything still queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a connected wakeup pair. Both ends are non-blocking.
pub fn wakeup_channel() -> Result<(WakeupSender, WakeupReceiver)> {
    let (reader, writer) = cloexec_pipe()?;
    set_nonblocking(&reader)?;
    set_nonblocking(&writer)?;
    Ok((WakeupSender { fd: writer }, WakeupReceiver { fd: reader }))
}

/// Write side of the wakeup channel.
pub struct WakeupSender {
    fd: PipeFd,
}

impl WakeupSender {
    /// Signal the worker.
    ///
    /// Never blocks: a full pipe already holds a pending wakeup.
    pub fn wake(&self) -> io::Result<()> {
        loop {
            match nix::unistd::write(&self.fd, b"T") {
                Ok(_) | Err(Errno::EAGAIN) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

/// Read side of the wakeup channel, owned by the worker loop.
pub struct WakeupReceiver {
    fd: PipeFd,
}

impl WakeupReceiver {
    /// Consume every pending token so repeated wakes coalesce.
    ///
    /// Returns the number of tokens read.
    pub fn drain(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 512];
        let mut total = 0;
        loop {
            match self.fd.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) => return Err(e),
            }
        }
    }
}

impl AsFd for WakeupReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
