//! Per-credential session registry
//!
//! Replaces process-wide static client handles: the registry is an ordinary
//! value handed to whoever builds clients, and it guarantees at most one
//! live session per credential.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::ClientError;
use crate::platform::Credential;

type Slot<S> = Arc<OnceCell<Arc<S>>>;

/// Lazily initialized sessions keyed by credential
#[derive(Debug)]
pub struct SessionRegistry<S> {
    sessions: Mutex<HashMap<Credential, Slot<S>>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Credential, Slot<S>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session for `credential`, creating it with `init` if none
    /// exists yet.
    ///
    /// Concurrent callers for the same credential share one `init` run. A
    /// failed `init` leaves the slot empty so a later call can try again.
    /// `init` may return the session itself or an `Arc` already holding it.
    pub async fn get_or_init<F, Fut, T>(
        &self,
        credential: &Credential,
        init: F,
    ) -> Result<Arc<S>, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
        T: Into<Arc<S>>,
    {
        let slot = self.lock().entry(credential.clone()).or_default().clone();

        let session = slot
            .get_or_try_init(move || async move {
                let session: Arc<S> = init().await?.into();
                info!(credential = %credential, "Session established");
                Ok::<_, ClientError>(session)
            })
            .await?;

        Ok(session.clone())
    }

    /// The session for `credential`, if one has been established
    pub fn get(&self, credential: &Credential) -> Option<Arc<S>> {
        self.lock()
            .get(credential)
            .and_then(|slot| slot.get().cloned())
    }

    /// Forget a session; the next `get_or_init` creates a fresh one
    pub fn remove(&self, credential: &Credential) -> Option<Arc<S>> {
        self.lock()
            .remove(credential)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
