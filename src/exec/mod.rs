//! Asynchronous plugin execution.
//!
//! Callers submit a [`ProcessTask`] with a completion callback. A single
//! worker thread launches tasks in submission order, never running more
//! than `max_tasks_per_thread` at once, reads each child's combined
//! stdout/stderr incrementally, reaps it, and posts the callback to a
//! [`CompletionSink`].
//!
//! ```text
//! submit() ──push──▶ TaskQueue ──pop──▶ ┌──────────────────────────┐
//!    │                                  │ worker loop              │
//!    └──wake──▶ self-pipe ──readiness──▶│  launch ▸ read ▸ reap    │──post──▶ CompletionSink
//!                                       └──────────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - [`env`]: Environment block construction
//! - [`task`]: Task, result and per-task state
//! - [`queue`]: Task queue and wakeup pipe
//! - [`ipc`]: Pipe descriptor helpers
//! - [`spawn`]: Process launching
//! - [`proc`]: Running process handle
//! - [`signals`]: Wait status decoding
//! - [`readiness`]: poll(2) and sleep-based readiness
//! - [`sink`]: Completion delivery
//! - `worker`: The worker loop
//! - `executor`: Public executor handle

pub mod env;
mod executor;
pub mod ipc;
pub mod proc;
pub mod queue;
pub mod readiness;
pub mod signals;
pub mod sink;
pub mod spawn;
pub mod task;
mod worker;

pub use executor::{Executor, GlobalExecutor, TaskHandle, global};
pub use readiness::ReadinessMode;
pub use signals::SENTINEL_EXIT_CODE;
pub use sink::{CompletionReceiver, CompletionSink, InlineSink, channel_sink};
pub use task::{Completion, ProcessResult, ProcessTask, TaskId};
pub use worker::ExecutorStats;
