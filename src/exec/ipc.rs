//! Pipe primitives for plugin output and worker wakeups.
//!
//! Provides an owned pipe descriptor with EINTR handling, plus helpers to
//! create close-on-exec pipes and switch descriptors to non-blocking mode.

use crate::error::{ProcmuxError, Result};
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
#[derive(Debug)]
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    /// Create from an owned file descriptor.
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Give up the wrapper and return the owned descriptor.
    pub fn into_owned(self) -> OwnedFd {
        self.fd
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Create a pipe whose ends are both close-on-exec.
///
/// Returns `(read_end, write_end)`. Both descriptors are closed if either
/// cannot be configured.
pub fn cloexec_pipe() -> Result<(PipeFd, PipeFd)> {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    let (read_fd, write_fd) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(ProcmuxError::Pipe)?;

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    )))]
    let (read_fd, write_fd) = {
        let (read_fd, write_fd) = nix::unistd::pipe().map_err(ProcmuxError::Pipe)?;
        set_cloexec(&read_fd)?;
        set_cloexec(&write_fd)?;
        (read_fd, write_fd)
    };

    Ok((PipeFd::new(read_fd), PipeFd::new(write_fd)))
}

/// Put a descriptor into non-blocking mode.
pub fn set_nonblocking<Fd: AsFd>(fd: Fd) -> Result<()> {
    let flags = fcntl(&fd, FcntlArg::F_GETFL).map_err(ProcmuxError::Descriptor)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(&fd, FcntlArg::F_SETFL(flags)).map_err(ProcmuxError::Descriptor)?;
    Ok(())
}

/// Mark a descriptor close-on-exec.
pub fn set_cloexec<Fd: AsFd>(fd: Fd) -> Result<()> {
    fcntl(&fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(ProcmuxError::Descriptor)?;
    Ok(())
}
