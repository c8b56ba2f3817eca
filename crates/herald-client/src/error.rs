//! Client error types

use herald_queue::QueueError;
use thiserror::Error;

use crate::platform::Platform;

/// Errors from platform sessions and throttled calls
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Session initialization failed: {0}")]
    Session(String),
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Rate limited by {platform}")]
    RateLimited { platform: Platform },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Queue error: {0}")]
    Queue(String),
}

impl From<QueueError<ClientError>> for ClientError {
    fn from(err: QueueError<ClientError>) -> Self {
        match err {
            QueueError::Failed { error, .. } => error,
            other => ClientError::Queue(other.to_string()),
        }
    }
}
