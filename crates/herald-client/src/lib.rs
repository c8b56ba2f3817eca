//! # Herald Client
//!
//! Platform client plumbing for Herald agents.
//!
//! Every outbound call a client makes (fetch a tweet, publish a cast, look
//! up a profile) goes through the [`herald_queue::ThrottledQueue`] that
//! belongs to its credential. Sessions are shared per credential through a
//! [`SessionRegistry`] instead of process-wide statics.
//!
//! ## Example
//!
//! ```rust
//! use herald_client::{ClientHub, Credential, MockSession, Platform};
//! use herald_queue::QueueConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = ClientHub::new(QueueConfig::fast());
//!     let credential = Credential::new(Platform::Twitter, "herald");
//!
//!     let client = hub
//!         .client(credential.clone(), || async move { Ok(MockSession::new(credential)) })
//!         .await
//!         .unwrap();
//!
//!     let id = client
//!         .call("post", |session| async move { session.post("gm").await })
//!         .await
//!         .unwrap();
//!     assert_eq!(id, 1);
//! }
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod platform;
pub mod registry;

pub use client::{ClientHub, ThrottledClient};
pub use error::ClientError;
pub use mock::{MockPost, MockSession, PostId};
pub use platform::{Credential, Platform, PlatformSession};
pub use registry::SessionRegistry;
