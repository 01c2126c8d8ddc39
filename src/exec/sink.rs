//! Completion delivery.
//!
//! The worker loop never runs a task's completion callback itself; it posts
//! a zero-argument closure into a `CompletionSink`, whose owner decides on
//! which thread and when the closure runs.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;

/// A deferred piece of work posted by the worker loop.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Destination for completion callbacks.
pub trait CompletionSink: Send + Sync {
    /// Schedule `callback` to run later.
    ///
    /// Callbacks posted by one thread must run in posting order.
    fn post(&self, callback: Callback);
}

/// Sink that queues callbacks for the thread holding the matching
/// [`CompletionReceiver`].
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<Callback>,
}

/// Owner side of a [`ChannelSink`]; runs posted callbacks on its thread.
#[derive(Clone)]
pub struct CompletionReceiver {
    rx: Receiver<Callback>,
}

/// Create a connected sink/receiver pair.
pub fn channel_sink() -> (ChannelSink, CompletionReceiver) {
    let (tx, rx) = unbounded();
    (ChannelSink { tx }, CompletionReceiver { rx })
}

impl CompletionSink for ChannelSink {
    fn post(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            tracing::warn!("Completion receiver dropped; discarding callback");
        }
    }
}

impl CompletionReceiver {
    /// Run every callback that is already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one callback and run it.
    ///
    /// Returns `false` if nothing arrived in time.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Number of callbacks waiting to run.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Sink that runs callbacks immediately on the posting thread.
///
/// Useful when the callbacks only forward results elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSink;

impl CompletionSink for InlineSink {
    fn post(&self, callback: Callback) {
        callback();
    }
}
