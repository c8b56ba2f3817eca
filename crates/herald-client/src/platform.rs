//! Platform identities and the session trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// Social platforms the agent can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Discord,
    Farcaster,
    Warpcast,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Discord,
        Platform::Farcaster,
        Platform::Warpcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Discord => "discord",
            Platform::Farcaster => "farcaster",
            Platform::Warpcast => "warpcast",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "discord" => Ok(Platform::Discord),
            "farcaster" => Ok(Platform::Farcaster),
            "warpcast" => Ok(Platform::Warpcast),
            other => Err(ClientError::Platform(format!("unknown platform '{}'", other))),
        }
    }
}

/// One authenticated identity on one platform; sessions and queues are
/// keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub platform: Platform,
    pub account: String,
}

impl Credential {
    pub fn new(platform: Platform, account: impl Into<String>) -> Self {
        Self {
            platform,
            account: account.into(),
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.account)
    }
}

/// An authenticated connection to a platform API
#[async_trait]
pub trait PlatformSession: Send + Sync + fmt::Debug {
    /// The identity this session acts as
    fn credential(&self) -> &Credential;

    /// Confirm the session is usable (login check, token refresh)
    async fn verify(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trips_through_str() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert_eq!("X".parse::<Platform>().unwrap(), Platform::Twitter);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_credential_display() {
        let credential = Credential::new(Platform::Farcaster, "herald");
        assert_eq!(credential.to_string(), "farcaster:herald");
    }
}
