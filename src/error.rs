//! Error types for procmux.

use thiserror::Error;

/// Main error type for procmux.
///
/// Construction errors (`InvalidCommand`, `InvalidEnvironment`, `Pipe` when
/// creating the wakeup channel, `WorkerStart`, `ShutDown` on submit) are
/// returned synchronously. Everything else is delivered through a task's
/// failure completion.
#[derive(Error, Debug)]
pub enum ProcmuxError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid environment variable '{key}': {reason}")]
    InvalidEnvironment { key: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create pipe: {0}")]
    Pipe(#[source] nix::errno::Errno),

    #[error("Failed to configure descriptor: {0}")]
    Descriptor(#[source] nix::errno::Errno),

    #[error("Failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read output of process {pid}: {source}")]
    Read {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to reap process {pid}: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start worker thread: {0}")]
    WorkerStart(#[source] std::io::Error),

    #[error("Executor is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for procmux operations.
pub type Result<T> = std::result::Result<T, ProcmuxError>;
