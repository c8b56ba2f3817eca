//! Mock platform session for testing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ClientError;
use crate::platform::{Credential, PlatformSession};

/// Identifier of a post made through a [`MockSession`]
pub type PostId = u64;

/// A post stored by the mock platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockPost {
    pub id: PostId,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory stand-in for a platform API.
///
/// Calls can be made to fail on demand (as a rate-limited API would) and
/// can take a simulated amount of time.
#[derive(Debug)]
pub struct MockSession {
    credential: Credential,
    latency: Duration,
    failures_remaining: AtomicU32,
    calls: AtomicU64,
    next_id: AtomicU64,
    posts: Mutex<Vec<MockPost>>,
}

impl MockSession {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            latency: Duration::from_millis(20),
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Set the simulated latency of each call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` calls fail with `RateLimited`
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Total calls received, failed ones included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Posts accepted so far, oldest first
    pub fn posts(&self) -> Vec<MockPost> {
        self.posts
            .lock()
            .map(|posts| posts.clone())
            .unwrap_or_default()
    }

    async fn begin_call(&self) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ClientError::RateLimited {
                platform: self.credential.platform,
            });
        }
        Ok(())
    }

    /// Publish a post
    pub async fn post(&self, text: &str) -> Result<PostId, ClientError> {
        self.begin_call().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let post = MockPost {
            id,
            author: self.credential.account.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.posts
            .lock()
            .map_err(|_| ClientError::Platform("post store poisoned".to_string()))?
            .push(post);
        Ok(id)
    }

    /// Fetch a post by id
    pub async fn fetch(&self, id: PostId) -> Result<MockPost, ClientError> {
        self.begin_call().await?;

        self.posts()
            .into_iter()
            .find(|post| post.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("post {}", id)))
    }
}

#[async_trait]
impl PlatformSession for MockSession {
    fn credential(&self) -> &Credential {
        &self.credential
    }
}
