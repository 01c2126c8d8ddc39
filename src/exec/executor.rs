//! Public executor handle.
//!
//! An `Executor` owns the task queue, the write end of the wakeup pipe, and
//! (once the first task is submitted) the worker thread.
//!
//! # Example
//!
//! ```no_run
//! use procmux::{Executor, ExecutorConfig, ProcessTask};
//!
//! let (executor, completions) = Executor::with_channel_sink(ExecutorConfig::default())?;
//! let task = ProcessTask::new(["/usr/lib/monitoring-plugins/check_load", "-w", "5"])?;
//! executor.submit(task, |completion| match completion {
//!     Ok(result) => println!("{}: {}", result.exit_code, result.output),
//!     Err(e) => eprintln!("check failed: {e}"),
//! })?;
//! completions.run_next(std::time::Duration::from_secs(30));
//! # Ok::<(), procmux::ProcmuxError>(())
//! ```

use super::queue::{WakeupReceiver, WakeupSender, wakeup_channel};
use super::sink::{CompletionReceiver, CompletionSink, channel_sink};
use super::task::{Completion, ProcessTask, TaskId};
use super::worker::{ExecutorStats, Job, Shared, Worker};
use crate::config::ExecutorConfig;
use crate::error::{ProcmuxError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Handle returned for each accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: TaskId,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

enum WorkerState {
    /// Not started yet; holds the wakeup read end for the worker.
    Idle(WakeupReceiver),
    Running(JoinHandle<()>),
    Stopped,
}

/// Runs plugin processes on a dedicated worker thread.
pub struct Executor {
    config: ExecutorConfig,
    shared: Arc<Shared>,
    wakeup: WakeupSender,
    sink: Arc<dyn CompletionSink>,
    next_id: AtomicU64,
    started: AtomicBool,
    worker: Mutex<WorkerState>,
}

impl Executor {
    /// Create an executor that posts completions to `sink`.
    ///
    /// The worker thread is not started until the first submission.
    pub fn new(config: ExecutorConfig, sink: Arc<dyn CompletionSink>) -> Result<Self> {
        config.validate()?;
        let (wakeup, receiver) = wakeup_channel()?;

        Ok(Self {
            config,
            shared: Arc::new(Shared::default()),
            wakeup,
            sink,
            next_id: AtomicU64::new(0),
            started: AtomicBool::new(false),
            worker: Mutex::new(WorkerState::Idle(receiver)),
        })
    }

    /// Create an executor whose completions run wherever the returned
    /// receiver is pumped.
    pub fn with_channel_sink(config: ExecutorConfig) -> Result<(Self, CompletionReceiver)> {
        let (sink, receiver) = channel_sink();
        Ok((Self::new(config, Arc::new(sink))?, receiver))
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Queue a task. `on_complete` is posted to the sink exactly once, with
    /// either the result or the error that stopped the task.
    ///
    /// Fails synchronously only if the executor is shut down or its worker
    /// thread cannot be started.
    pub fn submit<F>(&self, task: ProcessTask, on_complete: F) -> Result<TaskHandle>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        if self.shared.queue.is_closed() {
            return Err(ProcmuxError::ShutDown);
        }
        self.ensure_started()?;

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let job = Job {
            id,
            task,
            on_complete: Box::new(on_complete),
        };
        if self.shared.queue.push(job).is_err() {
            self.shared.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            return Err(ProcmuxError::ShutDown);
        }

        // The job is queued either way; a missed wakeup only delays it until
        // the next poll timeout.
        if let Err(e) = self.wakeup.wake() {
            warn!(task_id = %id, error = %e, "Failed to wake worker");
        }

        trace!(task_id = %id, "Queued task");
        Ok(TaskHandle { id })
    }

    /// Build a task from an argument vector and optional extra environment,
    /// then submit it.
    pub fn submit_command<I, S, F>(
        &self,
        arguments: I,
        extra_environment: Option<&BTreeMap<String, String>>,
        on_complete: F,
    ) -> Result<TaskHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(Completion) + Send + 'static,
    {
        let task = match extra_environment {
            Some(extra) => ProcessTask::with_environment(arguments, extra)?,
            None => ProcessTask::new(arguments)?,
        };
        self.submit(task, on_complete)
    }

    fn lock_worker(&self) -> MutexGuard<'_, WorkerState> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut state = self.lock_worker();
        match std::mem::replace(&mut *state, WorkerState::Stopped) {
            WorkerState::Idle(receiver) => {
                let worker = Worker::new(
                    self.config.clone(),
                    Arc::clone(&self.shared),
                    receiver,
                    Arc::clone(&self.sink),
                );
                let spawned = thread::Builder::new()
                    .name("procmux-worker".to_string())
                    .spawn(move || worker.run());

                match spawned {
                    Ok(handle) => {
                        debug!("Started worker thread");
                        *state = WorkerState::Running(handle);
                        self.started.store(true, Ordering::Release);
                        Ok(())
                    }
                    Err(e) => {
                        // The wakeup receiver went down with the closure.
                        self.shared.queue.close();
                        Err(ProcmuxError::WorkerStart(e))
                    }
                }
            }
            WorkerState::Running(handle) => {
                *state = WorkerState::Running(handle);
                Ok(())
            }
            WorkerState::Stopped => Err(ProcmuxError::ShutDown),
        }
    }

    /// Stop accepting work and wait for the worker thread to exit.
    ///
    /// Queued tasks receive a `ShutDown` failure; tasks already running are
    /// read to completion first. Idempotent. When called from a completion
    /// callback running on the worker thread itself, the thread is not
    /// joined.
    pub fn shutdown(&self) {
        self.shared.queue.close();
        if let Err(e) = self.wakeup.wake() {
            warn!(error = %e, "Failed to wake worker for shutdown");
        }

        let previous = std::mem::replace(&mut *self.lock_worker(), WorkerState::Stopped);
        if let WorkerState::Running(handle) = previous {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
            debug!("Worker thread joined");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Current queue, activity and outcome counters.
    pub fn stats(&self) -> ExecutorStats {
        self.shared.counters.snapshot(self.shared.queue.len())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The process-wide executor and the receiver for its completions.
pub struct GlobalExecutor {
    executor: Executor,
    completions: CompletionReceiver,
}

impl GlobalExecutor {
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Pump this to run completion callbacks.
    pub fn completions(&self) -> &CompletionReceiver {
        &self.completions
    }
}

impl std::ops::Deref for GlobalExecutor {
    type Target = Executor;

    fn deref(&self) -> &Executor {
        &self.executor
    }
}

static GLOBAL: OnceLock<GlobalExecutor> = OnceLock::new();

/// Get the process-wide executor, creating it on first use.
///
/// Configured from defaults plus `PROCMUX_*` environment overrides. It lives
/// for the rest of the process.
pub fn global() -> Result<&'static GlobalExecutor> {
    if let Some(global) = GLOBAL.get() {
        return Ok(global);
    }

    let config = ExecutorConfig::default().with_env_overrides();
    let (executor, completions) = Executor::with_channel_sink(config)?;
    // A racing initializer may win; the losing executor never started and
    // is simply dropped.
    Ok(GLOBAL.get_or_init(|| GlobalExecutor {
        executor,
        completions,
    }))
}
