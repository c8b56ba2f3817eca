//! # Herald Queue
//!
//! Throttled request queue for calls to rate-limited social platform APIs.
//!
//! Features:
//! - Strict FIFO, one operation in flight per queue
//! - Randomized spacing between successful calls
//! - Exponential backoff with retry at the head of the queue
//! - Optional retry ceiling, per-attempt timeout and dead-letter inspection
//! - Cooperative shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use herald_queue::{QueueConfig, ThrottledQueue};
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = ThrottledQueue::new("twitter:example", QueueConfig::fast());
//!
//!     let followers = queue
//!         .submit(|| async { Ok::<_, String>(42) })
//!         .await
//!         .unwrap();
//!     assert_eq!(followers, 42);
//! }
//! ```

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod operation;
pub mod queue;
pub mod stats;

pub use config::{BackoffBasis, QueueConfig};
pub use dead_letter::DeadLetter;
pub use error::{ConfigError, QueueError};
pub use operation::{AttemptOutcome, OperationId, Submission};
pub use queue::ThrottledQueue;
pub use stats::QueueStatsSnapshot;
