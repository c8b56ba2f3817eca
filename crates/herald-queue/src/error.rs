//! Queue error types

use std::time::Duration;

/// Terminal outcome delivered to a caller whose operation did not succeed.
///
/// `E` is the operation's own error type; `Failed` carries the exact error
/// produced by the last attempt.
#[derive(Debug, thiserror::Error)]
pub enum QueueError<E> {
    #[error("operation failed after {attempts} attempt(s): {error}")]
    Failed { attempts: u32, error: E },
    #[error("operation timed out after {attempts} attempt(s) ({timeout:?} per attempt)")]
    TimedOut { attempts: u32, timeout: Duration },
    #[error("operation panicked after {attempts} attempt(s): {message}")]
    Panicked { attempts: u32, message: String },
    #[error("queue shut down before the operation completed")]
    Shutdown,
}

impl<E> QueueError<E> {
    /// Number of attempts made before giving up. `Shutdown` does not track
    /// attempts and reports zero.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::Panicked { attempts, .. } => *attempts,
            Self::Shutdown => 0,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Errors from loading or validating a [`crate::QueueConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
