//! Throttled queue and its drain task

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{BackoffBasis, QueueConfig};
use crate::dead_letter::{DeadLetter, DeadLetterBox};
use crate::operation::{
    AttemptOutcome, PendingOperation, QueuedOperation, RetryableCall, Submission,
};
use crate::stats::{QueueStats, QueueStatsSnapshot};

/// Serializes calls to one rate-limited dependency.
///
/// Operations run one at a time in submission order. After a success the
/// drain task pauses for a random delay within the configured spacing; after
/// a failure the operation goes back to the head of the queue and the drain
/// task backs off exponentially before retrying it.
///
/// Cloning is cheap and every clone feeds the same queue.
#[derive(Clone)]
pub struct ThrottledQueue {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: QueueConfig,
    state: Mutex<State>,
    dead_letters: Mutex<DeadLetterBox>,
    stats: QueueStats,
    shutdown: watch::Sender<bool>,
    idle: Notify,
}

#[derive(Default)]
struct State {
    pending: VecDeque<PendingOperation>,
    /// Drain task that owns the queue; cleared when it goes idle
    drain: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl State {
    /// Whether a drain task exists that can still make progress. A task
    /// dropped with its runtime counts as finished.
    fn drain_alive(&self) -> bool {
        self.drain.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl ThrottledQueue {
    /// Create a queue. `name` shows up in logs and dead letters.
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                dead_letters: Mutex::new(DeadLetterBox::new(config.dead_letter_capacity)),
                config,
                state: Mutex::new(State::default()),
                stats: QueueStats::default(),
                shutdown,
                idle: Notify::new(),
            }),
        }
    }

    /// Create a queue with [`QueueConfig::default`]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, QueueConfig::default())
    }

    /// Queue an operation and return a handle to its result.
    ///
    /// The operation is appended immediately; if no drain task is running one
    /// is started. `operation` may be invoked several times when attempts
    /// fail, so each call must produce a fresh future.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while the queue is idle.
    pub fn submit<F, Fut, T, E>(&self, operation: F) -> Submission<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let task = Box::new(RetryableCall::new(operation, responder));
        self.inner.stats.record_submitted();

        let refused = {
            let mut state = self.inner.lock_state();
            if state.shut_down {
                Some(task)
            } else {
                state.pending.push_back(PendingOperation::new(id, task));
                if !state.drain_alive() {
                    state.drain = Some(tokio::spawn(self.inner.clone().drain()));
                }
                None
            }
        };

        if let Some(task) = refused {
            debug!(
                queue = %self.inner.name,
                operation_id = %id,
                "Rejecting submission to shut down queue"
            );
            self.inner.stats.record_rejected(1);
            task.reject();
        }

        Submission::new(id, receiver)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Operations waiting to run, including one waiting out a retry backoff
    pub fn len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a drain task is currently active
    pub fn is_processing(&self) -> bool {
        self.inner.lock_state().drain_alive()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock_state().shut_down
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Abandoned operations still held for inspection
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock_dead_letters().snapshot()
    }

    /// Remove and return the held dead letters
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock_dead_letters().take()
    }

    /// Stop processing.
    ///
    /// Pending operations are answered with [`crate::QueueError::Shutdown`]
    /// right away and new submissions are refused. An attempt already in
    /// flight is not pending; it runs to completion.
    pub fn shutdown(&self) {
        let orphaned: Vec<_> = {
            let mut state = self.inner.lock_state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.pending.drain(..).collect()
        };

        info!(queue = %self.inner.name, "Shutting down throttled queue");
        self.inner.reject_all(orphaned);
        self.inner.shutdown.send_replace(true);
    }

    /// Wait until no drain task is active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_processing() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ThrottledQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledQueue")
            .field("name", &self.inner.name)
            .field("pending", &self.len())
            .field("processing", &self.is_processing())
            .finish()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_dead_letters(&self) -> MutexGuard<'_, DeadLetterBox> {
        self.dead_letters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject_all(&self, operations: Vec<PendingOperation>) {
        if operations.is_empty() {
            return;
        }
        self.stats.record_rejected(operations.len() as u64);
        for operation in operations {
            operation.task.reject();
        }
    }

    /// Process the queue head until the queue is empty or shut down
    async fn drain(self: Arc<Self>) {
        let mut guard = DrainGuard {
            inner: self.clone(),
            armed: true,
        };
        let mut shutdown = self.shutdown.subscribe();

        debug!(queue = %self.name, "Drain task started");

        loop {
            let next = {
                let mut state = self.lock_state();
                if state.shut_down {
                    // A retry re-queued after shutdown lands here.
                    state.drain = None;
                    Err(state.pending.drain(..).collect::<Vec<_>>())
                } else {
                    match state.pending.pop_front() {
                        Some(operation) => Ok(operation),
                        None => {
                            state.drain = None;
                            Err(Vec::new())
                        }
                    }
                }
            };

            let mut operation = match next {
                Ok(operation) => operation,
                Err(orphaned) => {
                    guard.armed = false;
                    self.reject_all(orphaned);
                    self.idle.notify_waiters();
                    debug!(queue = %self.name, "Drain task idle");
                    return;
                }
            };

            operation.attempts += 1;
            debug!(
                queue = %self.name,
                operation_id = %operation.id,
                attempt = operation.attempts,
                "Running queued operation"
            );

            let outcome = operation.task.attempt(self.config.operation_timeout).await;
            let delay = match outcome {
                AttemptOutcome::Succeeded => {
                    self.stats.record_success();
                    self.config.spacing_delay()
                }
                AttemptOutcome::Failed(message) => self.handle_failure(operation, message),
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Re-queue or abandon a failed operation; returns the backoff to apply
    fn handle_failure(&self, operation: PendingOperation, message: String) -> Duration {
        let attempts = operation.attempts;

        if self.config.allows_retry(attempts) {
            self.stats.record_failure(true);
            let id = operation.id;

            let depth = {
                let mut state = self.lock_state();
                state.pending.push_front(operation);
                state.pending.len()
            };

            let delay = self.config.backoff_delay(self.retry_count(attempts, depth));
            warn!(
                queue = %self.name,
                operation_id = %id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Queued operation failed, retrying after backoff"
            );
            return delay;
        }

        self.stats.record_failure(false);
        let depth = self.lock_state().pending.len() + 1;
        let delay = self.config.backoff_delay(self.retry_count(attempts, depth));

        error!(
            queue = %self.name,
            operation_id = %operation.id,
            attempts = attempts,
            error = %message,
            "Queued operation abandoned after exhausting retries"
        );

        self.lock_dead_letters().push(DeadLetter {
            id: operation.id,
            queue: self.name.clone(),
            attempts,
            last_error: message,
            enqueued_at: operation.enqueued_at,
            abandoned_at: Utc::now(),
        });
        operation.task.abandon(attempts);

        delay
    }

    fn retry_count(&self, attempts: u32, depth: usize) -> u32 {
        match self.config.backoff_basis {
            BackoffBasis::Attempt => attempts,
            BackoffBasis::QueueDepth => u32::try_from(depth).unwrap_or(u32::MAX),
        }
    }
}

/// Hands the queue on if a drain task ends without reaching its idle
/// transition (panic, abort or runtime teardown).
///
/// A replacement is spawned when work remains and a runtime is reachable.
/// If that runtime is itself shutting down the replacement never runs; its
/// handle then reports finished and the next `submit` starts a fresh drain.
struct DrainGuard {
    inner: Arc<Inner>,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let restarted = {
            let mut state = self.inner.lock_state();
            let handle = tokio::runtime::Handle::try_current().ok();
            match handle {
                Some(handle) if !state.shut_down && !state.pending.is_empty() => {
                    state.drain = Some(handle.spawn(self.inner.clone().drain()));
                    true
                }
                _ => {
                    state.drain = None;
                    false
                }
            }
        };

        if restarted {
            error!(queue = %self.inner.name, "Drain task stopped unexpectedly, restarting");
            self.inner.stats.record_drain_restart();
        } else {
            warn!(queue = %self.inner.name, "Drain task stopped before going idle");
            self.inner.idle.notify_waiters();
        }
    }
}
