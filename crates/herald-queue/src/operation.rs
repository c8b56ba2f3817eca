//! Queued operation definitions

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::QueueError;

/// Operation identifier
pub type OperationId = Uuid;

/// Result of running one attempt of a queued operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The operation succeeded and its caller has been answered
    Succeeded,
    /// The attempt failed; the message describes why
    Failed(String),
}

/// A type-erased, retryable unit of work owned by the queue.
///
/// Implementations hold the caller's responder and answer it exactly once:
/// on the first successful attempt, from [`QueuedOperation::abandon`], or
/// from [`QueuedOperation::reject`].
pub(crate) trait QueuedOperation: Send {
    /// Run one attempt, bounded by `timeout` if set.
    fn attempt(&mut self, timeout: Option<Duration>) -> BoxFuture<'_, AttemptOutcome>;

    /// Give up after `attempts` failed attempts, answering the caller with
    /// the last failure.
    fn abandon(self: Box<Self>, attempts: u32);

    /// Answer the caller with `QueueError::Shutdown` without running again.
    fn reject(self: Box<Self>);
}

/// A pending operation with its bookkeeping
pub(crate) struct PendingOperation {
    pub id: OperationId,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub task: Box<dyn QueuedOperation>,
}

impl PendingOperation {
    pub fn new(id: OperationId, task: Box<dyn QueuedOperation>) -> Self {
        Self {
            id,
            enqueued_at: Utc::now(),
            attempts: 0,
            task,
        }
    }
}

/// Why the most recent attempt failed
enum LastFailure<E> {
    Error(E),
    TimedOut(Duration),
    Panicked(String),
}

/// Concrete operation: the caller's closure plus the responder for its
/// [`Submission`].
pub(crate) struct RetryableCall<F, T, E> {
    operation: F,
    responder: Option<oneshot::Sender<Result<T, QueueError<E>>>>,
    last_failure: Option<LastFailure<E>>,
}

impl<F, T, E> RetryableCall<F, T, E> {
    pub fn new(operation: F, responder: oneshot::Sender<Result<T, QueueError<E>>>) -> Self {
        Self {
            operation,
            responder: Some(responder),
            last_failure: None,
        }
    }

    fn respond(&mut self, result: Result<T, QueueError<E>>) {
        if let Some(responder) = self.responder.take() {
            // The caller may have dropped its Submission; nothing to deliver then.
            let _ = responder.send(result);
        }
    }
}

impl<F, Fut, T, E> QueuedOperation for RetryableCall<F, T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn attempt(&mut self, timeout: Option<Duration>) -> BoxFuture<'_, AttemptOutcome> {
        // Building the future runs caller code too, so it is guarded like polling.
        let started = std::panic::catch_unwind(AssertUnwindSafe(|| (self.operation)()));

        Box::pin(async move {
            let outcome = match started {
                Ok(future) => {
                    let guarded = AssertUnwindSafe(future).catch_unwind();
                    match timeout {
                        Some(limit) => match tokio::time::timeout(limit, guarded).await {
                            Ok(result) => result,
                            Err(_) => {
                                self.last_failure = Some(LastFailure::TimedOut(limit));
                                return AttemptOutcome::Failed(format!(
                                    "timed out after {:?}",
                                    limit
                                ));
                            }
                        },
                        None => guarded.await,
                    }
                }
                Err(panic) => Err(panic),
            };

            match outcome {
                Ok(Ok(value)) => {
                    self.last_failure = None;
                    self.respond(Ok(value));
                    AttemptOutcome::Succeeded
                }
                Ok(Err(error)) => {
                    let message = error.to_string();
                    self.last_failure = Some(LastFailure::Error(error));
                    AttemptOutcome::Failed(message)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    self.last_failure = Some(LastFailure::Panicked(message.clone()));
                    AttemptOutcome::Failed(format!("panicked: {}", message))
                }
            }
        })
    }

    fn abandon(mut self: Box<Self>, attempts: u32) {
        let error = match self.last_failure.take() {
            Some(LastFailure::Error(error)) => QueueError::Failed { attempts, error },
            Some(LastFailure::TimedOut(timeout)) => QueueError::TimedOut { attempts, timeout },
            Some(LastFailure::Panicked(message)) => QueueError::Panicked { attempts, message },
            None => QueueError::Shutdown,
        };
        self.respond(Err(error));
    }

    fn reject(mut self: Box<Self>) {
        self.respond(Err(QueueError::Shutdown));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle returned by [`crate::ThrottledQueue::submit`].
///
/// Resolves once with the submitted operation's own result. The operation
/// was queued when `submit` returned; dropping the handle does not withdraw
/// it.
#[must_use = "dropping a Submission discards the operation's result"]
pub struct Submission<T, E> {
    id: OperationId,
    receiver: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> Submission<T, E> {
    pub(crate) fn new(
        id: OperationId,
        receiver: oneshot::Receiver<Result<T, QueueError<E>>>,
    ) -> Self {
        Self { id, receiver }
    }

    /// Identifier of the queued operation (matches [`crate::DeadLetter::id`])
    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl<T, E> Future for Submission<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Responder dropped without an answer: the queue went away.
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> std::fmt::Debug for Submission<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission").field("id", &self.id).finish()
    }
}
