//! Throttled clients and the hub that hands them out

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use herald_queue::{QueueConfig, QueueError, QueueStatsSnapshot, ThrottledQueue};
use tracing::{debug, error, info};

use crate::error::ClientError;
use crate::platform::{Credential, PlatformSession};
use crate::registry::SessionRegistry;

/// A platform session whose every outbound call goes through a throttled queue
pub struct ThrottledClient<S> {
    credential: Credential,
    session: Arc<S>,
    queue: ThrottledQueue,
}

impl<S> Clone for ThrottledClient<S> {
    fn clone(&self) -> Self {
        Self {
            credential: self.credential.clone(),
            session: self.session.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> ThrottledClient<S> {
    pub fn new(credential: Credential, session: Arc<S>, queue: ThrottledQueue) -> Self {
        Self {
            credential,
            session,
            queue,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn queue(&self) -> &ThrottledQueue {
        &self.queue
    }

    /// Run `op` against the session once the queue reaches it.
    ///
    /// `action` names the call in logs. `op` is invoked again for every
    /// retry, each time with the shared session.
    pub async fn call<F, Fut, T, E>(&self, action: &str, mut op: F) -> Result<T, QueueError<E>>
    where
        F: FnMut(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let session = self.session.clone();
        let result = self.queue.submit(move || op(session.clone())).await;

        match &result {
            Ok(_) => debug!(credential = %self.credential, action, "Request completed"),
            Err(e) => error!(
                credential = %self.credential,
                action,
                attempts = e.attempts(),
                error = %e,
                "Error processing request"
            ),
        }
        result
    }
}

impl<S> std::fmt::Debug for ThrottledClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledClient")
            .field("credential", &self.credential)
            .field("queue", &self.queue)
            .finish()
    }
}

/// Builds [`ThrottledClient`]s, sharing one session and one queue per
/// credential. Different credentials never throttle each other.
pub struct ClientHub<S> {
    config: QueueConfig,
    sessions: SessionRegistry<S>,
    queues: Mutex<HashMap<Credential, ThrottledQueue>>,
}

impl<S: PlatformSession + 'static> ClientHub<S> {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            sessions: SessionRegistry::new(),
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<Credential, ThrottledQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Client for `credential`. The first request for a credential creates
    /// its session with `init`, then verifies it through the credential's
    /// queue like any other platform call.
    pub async fn client<F, Fut>(
        &self,
        credential: Credential,
        init: F,
    ) -> Result<ThrottledClient<S>, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, ClientError>>,
    {
        let queue = self.queue_for(&credential);

        let verify_queue = queue.clone();
        let session = self
            .sessions
            .get_or_init(&credential, move || async move {
                let session = Arc::new(init().await?);
                let verifying = session.clone();
                verify_queue
                    .submit(move || {
                        let session = verifying.clone();
                        async move { session.verify().await }
                    })
                    .await?;
                Ok(session)
            })
            .await?;

        Ok(ThrottledClient::new(credential, session, queue))
    }

    /// The queue for `credential`, created on first use
    fn queue_for(&self, credential: &Credential) -> ThrottledQueue {
        self.lock_queues()
            .entry(credential.clone())
            .or_insert_with(|| ThrottledQueue::new(credential.to_string(), self.config.clone()))
            .clone()
    }

    pub fn sessions(&self) -> &SessionRegistry<S> {
        &self.sessions
    }

    /// Counters for every queue created so far
    pub fn queue_stats(&self) -> Vec<(Credential, QueueStatsSnapshot)> {
        let mut stats: Vec<_> = self
            .lock_queues()
            .iter()
            .map(|(credential, queue)| (credential.clone(), queue.stats()))
            .collect();
        stats.sort_by_key(|(credential, _)| credential.to_string());
        stats
    }

    /// Shut down every queue; pending calls fail with `QueueError::Shutdown`
    pub fn shutdown_all(&self) {
        let queues: Vec<ThrottledQueue> = self.lock_queues().values().cloned().collect();
        info!(queues = queues.len(), "Shutting down client queues");
        for queue in queues {
            queue.shutdown();
        }
    }
}
