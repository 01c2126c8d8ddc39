//! procmux - asynchronous execution of monitoring plugins.
//!
//! Runs external check commands on a dedicated worker thread, captures their
//! combined output without blocking, and reports each result through a
//! completion callback. See [`exec`] for the moving parts.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod output;

pub use config::ExecutorConfig;
pub use error::{ProcmuxError, Result};
pub use exec::{
    Completion, CompletionReceiver, CompletionSink, Executor, ExecutorStats, GlobalExecutor,
    InlineSink, ProcessResult, ProcessTask, ReadinessMode, SENTINEL_EXIT_CODE, TaskHandle, TaskId,
    channel_sink, global,
};
