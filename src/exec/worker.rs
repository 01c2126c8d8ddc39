//! The worker loop.
//!
//! One dedicated thread owns every running plugin. Each iteration waits for
//! readiness on the wakeup pipe plus every active output pipe, services the
//! ready pipes one chunk at a time, then admits queued tasks up to the
//! concurrency bound. Completions are handed to the sink; the loop never
//! runs a callback itself.

use super::queue::{TaskQueue, WakeupReceiver};
use super::readiness::{self, Readiness, ReadySet};
use super::sink::CompletionSink;
use super::spawn::launch;
use super::task::{ActiveTask, Completion, ProcessTask, Step, TaskId};
use crate::config::ExecutorConfig;
use crate::error::ProcmuxError;
use serde::Serialize;
use std::collections::HashMap;
use std::os::unix::io::{AsFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, trace, warn};

/// Callback supplied at submission.
pub(crate) type OnComplete = Box<dyn FnOnce(Completion) + Send + 'static>;

/// A queued submission.
pub(crate) struct Job {
    pub id: TaskId,
    pub task: ProcessTask,
    pub on_complete: OnComplete,
}

/// State shared between submitters and the worker thread.
#[derive(Default)]
pub(crate) struct Shared {
    pub queue: TaskQueue<Job>,
    pub counters: Counters,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Counters {
    fn set_active(&self, active: usize) {
        self.active.store(active, Ordering::Relaxed);
        self.max_active.fetch_max(active, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued: usize) -> ExecutorStats {
        ExecutorStats {
            queued,
            active: self.active.load(Ordering::Relaxed),
            max_active: self.max_active.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time executor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Children currently running.
    pub active: usize,
    /// Highest number of children ever running at once.
    pub max_active: usize,
    /// Tasks accepted by `submit`.
    pub submitted: u64,
    /// Tasks that produced a result.
    pub completed: u64,
    /// Tasks that produced an error.
    pub failed: u64,
}

struct Slot {
    task: ActiveTask,
    on_complete: OnComplete,
}

pub(crate) struct Worker {
    config: ExecutorConfig,
    shared: Arc<Shared>,
    wakeup: WakeupReceiver,
    readiness: Box<dyn Readiness>,
    sink: Arc<dyn CompletionSink>,
    /// Keyed by the raw descriptor of each task's output pipe.
    active: HashMap<RawFd, Slot>,
}

impl Worker {
    pub fn new(
        config: ExecutorConfig,
        shared: Arc<Shared>,
        wakeup: WakeupReceiver,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        let readiness = readiness::for_mode(config.readiness, config.fallback_interval);
        Self {
            config,
            shared,
            wakeup,
            readiness,
            sink,
            active: HashMap::new(),
        }
    }

    /// Run until the queue is closed and every active task has finished.
    pub fn run(mut self) {
        info!(
            max_tasks = self.config.max_tasks_per_thread,
            readiness = %self.config.readiness,
            "Worker loop started"
        );

        loop {
            if self.shared.queue.is_closed() {
                self.reject_queued();
                if self.active.is_empty() {
                    break;
                }
            }
            self.tick();
        }

        info!("Worker loop stopped");
    }

    fn tick(&mut self) {
        let mut keys = Vec::with_capacity(self.active.len());
        let ready = {
            let mut sources = Vec::with_capacity(self.active.len() + 1);
            sources.push(self.wakeup.as_fd());
            for (key, slot) in &self.active {
                if let Some(fd) = slot.task.process().output_fd() {
                    keys.push(*key);
                    sources.push(fd);
                }
            }

            match self.readiness.wait(&sources, self.config.poll_timeout) {
                Ok(ready) => ready,
                Err(e) => {
                    warn!(error = %e, "Readiness wait failed");
                    std::thread::sleep(self.config.fallback_interval);
                    ReadySet::none(sources.len())
                }
            }
        };

        if ready.is_ready(0) {
            match self.wakeup.drain() {
                Ok(tokens) => trace!(tokens, "Drained wakeup pipe"),
                Err(e) => warn!(error = %e, "Failed to drain wakeup pipe"),
            }
        }

        for (index, key) in keys.iter().enumerate() {
            if ready.is_ready(index + 1) {
                self.service(*key);
            }
        }

        self.admit();
    }

    /// Perform one read step for the task behind `key`.
    fn service(&mut self, key: RawFd) {
        let Some(slot) = self.active.get_mut(&key) else {
            return;
        };

        match slot.task.service(self.config.read_chunk_size) {
            Ok(Step::More) => {}
            Ok(Step::Finished(result)) => {
                if let Some(slot) = self.remove(key) {
                    debug!(
                        task_id = %result.task_id,
                        exit_code = result.exit_code,
                        bytes = result.output.len(),
                        active = self.active.len(),
                        "Task completed"
                    );
                    self.shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                    self.post(slot.on_complete, Ok(result));
                }
            }
            Err(e) => {
                // Dropping the slot kills and reaps the child if still needed.
                if let Some(slot) = self.remove(key) {
                    warn!(task_id = %slot.task.id(), error = %e, "Task failed while running");
                    self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    let Slot { task, on_complete } = slot;
                    drop(task);
                    self.post(on_complete, Err(e));
                }
            }
        }
    }

    fn remove(&mut self, key: RawFd) -> Option<Slot> {
        let slot = self.active.remove(&key);
        self.shared.counters.set_active(self.active.len());
        slot
    }

    /// Launch queued tasks, oldest first, until the active set is full.
    fn admit(&mut self) {
        while self.active.len() < self.config.max_tasks_per_thread {
            let Some(job) = self.shared.queue.pop() else {
                break;
            };

            match launch(&job.task) {
                Ok(process) => {
                    let key = process.fd();
                    debug!(
                        task_id = %job.id,
                        pid = process.pid().as_raw(),
                        fd = key,
                        active = self.active.len() + 1,
                        queued = self.shared.queue.len(),
                        "Admitted task"
                    );
                    self.active.insert(
                        key,
                        Slot {
                            task: ActiveTask::new(job.id, process),
                            on_complete: job.on_complete,
                        },
                    );
                    self.shared.counters.set_active(self.active.len());
                }
                Err(e) => {
                    warn!(task_id = %job.id, error = %e, "Failed to launch task");
                    self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    self.post(job.on_complete, Err(e));
                }
            }
        }
    }

    /// Fail every task still waiting in a closed queue.
    fn reject_queued(&mut self) {
        let rejected = self.shared.queue.drain();
        if rejected.is_empty() {
            return;
        }

        debug!(count = rejected.len(), "Rejecting queued tasks on shutdown");
        for job in rejected {
            self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.post(job.on_complete, Err(ProcmuxError::ShutDown));
        }
    }

    fn post(&self, on_complete: OnComplete, completion: Completion) {
        self.sink.post(Box::new(move || on_complete(completion)));
    }
}
