//! Queue configuration
//!
//! Spacing, backoff, retry ceiling and timeout settings for a
//! [`crate::ThrottledQueue`]. Defaults match the pacing the platform
//! clients have always used against Twitter and Farcaster.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Largest exponent applied to `backoff_base`; keeps the multiplication in range.
const MAX_BACKOFF_EXPONENT: u32 = 32;

/// What drives the exponent of the failure backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffBasis {
    /// Number of attempts the failing operation has made so far.
    Attempt,
    /// Number of operations pending once the failed one is re-queued.
    /// Backoff grows with unrelated backlog; kept for compatibility with
    /// the older client pacing.
    QueueDepth,
}

impl BackoffBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attempt => "attempt",
            Self::QueueDepth => "queue-depth",
        }
    }
}

impl std::str::FromStr for BackoffBasis {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attempt" => Ok(Self::Attempt),
            "queue-depth" | "queue_depth" | "depth" => Ok(Self::QueueDepth),
            other => Err(ConfigError::InvalidValue {
                var: "backoff_basis".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Throttled queue configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Lower bound of the random delay after a successful operation
    pub min_spacing: Duration,
    /// Upper bound of the random delay after a successful operation
    pub max_spacing: Duration,
    /// Backoff unit; the delay after a failure is `backoff_base * 2^n`
    pub backoff_base: Duration,
    /// Ceiling for a single backoff delay
    pub max_backoff: Duration,
    /// Source of `n` in the backoff formula
    pub backoff_basis: BackoffBasis,
    /// Attempts before an operation is abandoned (`None` retries forever)
    pub max_attempts: Option<u32>,
    /// Deadline for a single attempt (`None` waits forever)
    pub operation_timeout: Option<Duration>,
    /// How many abandoned operations are kept for inspection
    pub dead_letter_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_millis(1500),
            max_spacing: Duration::from_millis(3500),
            backoff_base: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(300),
            backoff_basis: BackoffBasis::Attempt,
            max_attempts: Some(5),
            operation_timeout: Some(Duration::from_secs(60)),
            dead_letter_capacity: 100,
        }
    }
}

impl QueueConfig {
    /// Legacy client pacing: backoff driven by queue depth, unlimited
    /// retries and no attempt deadline.
    pub fn faithful() -> Self {
        Self {
            max_backoff: Duration::MAX,
            backoff_basis: BackoffBasis::QueueDepth,
            max_attempts: None,
            operation_timeout: None,
            ..Self::default()
        }
    }

    /// Short delays for demos and tests
    pub fn fast() -> Self {
        Self {
            min_spacing: Duration::from_millis(15),
            max_spacing: Duration::from_millis(35),
            backoff_base: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            operation_timeout: Some(Duration::from_secs(5)),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            min_spacing: env_millis("HERALD_QUEUE_MIN_SPACING_MS")?
                .unwrap_or(defaults.min_spacing),
            max_spacing: env_millis("HERALD_QUEUE_MAX_SPACING_MS")?
                .unwrap_or(defaults.max_spacing),
            backoff_base: env_millis("HERALD_QUEUE_BACKOFF_BASE_MS")?
                .unwrap_or(defaults.backoff_base),
            max_backoff: env_millis("HERALD_QUEUE_MAX_BACKOFF_MS")?
                .unwrap_or(defaults.max_backoff),
            backoff_basis: match env::var("HERALD_QUEUE_BACKOFF_BASIS") {
                Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                    var: "HERALD_QUEUE_BACKOFF_BASIS".to_string(),
                    value,
                })?,
                Err(_) => defaults.backoff_basis,
            },
            max_attempts: match env::var("HERALD_QUEUE_MAX_ATTEMPTS") {
                Ok(value) => parse_max_attempts(&value).ok_or(ConfigError::InvalidValue {
                    var: "HERALD_QUEUE_MAX_ATTEMPTS".to_string(),
                    value,
                })?,
                Err(_) => defaults.max_attempts,
            },
            operation_timeout: match env_millis("HERALD_QUEUE_TIMEOUT_MS")? {
                Some(timeout) if timeout.is_zero() => None,
                Some(timeout) => Some(timeout),
                None => defaults.operation_timeout,
            },
            dead_letter_capacity: match env::var("HERALD_QUEUE_DEAD_LETTER_CAPACITY") {
                Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    var: "HERALD_QUEUE_DEAD_LETTER_CAPACITY".to_string(),
                    value,
                })?,
                Err(_) => defaults.dead_letter_capacity,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the settings describe a usable queue
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_spacing > self.max_spacing {
            return Err(ConfigError::Invalid(format!(
                "min_spacing ({:?}) exceeds max_spacing ({:?})",
                self.min_spacing, self.max_spacing
            )));
        }
        if self.backoff_base.is_zero() {
            return Err(ConfigError::Invalid(
                "backoff_base must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff < self.backoff_base {
            return Err(ConfigError::Invalid(format!(
                "max_backoff ({:?}) is below backoff_base ({:?})",
                self.max_backoff, self.backoff_base
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if matches!(self.operation_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigError::Invalid(
                "operation_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sample the pause that follows a successful operation
    pub fn spacing_delay(&self) -> Duration {
        let min = self.min_spacing.as_millis() as u64;
        let max = self.max_spacing.as_millis() as u64;
        if min >= max {
            return self.min_spacing;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Pause that follows a failure: `backoff_base * 2^retry_count`, capped
    /// at `max_backoff`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count.min(MAX_BACKOFF_EXPONENT));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_backoff)
    }

    /// Whether an operation that has made `attempts` attempts may try again
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

fn env_millis(var: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_max_attempts(value: &str) -> Option<Option<u32>> {
    match value.trim().to_lowercase().as_str() {
        "0" | "unlimited" | "none" => Some(None),
        other => other.parse::<u32>().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.min_spacing, Duration::from_millis(1500));
        assert_eq!(config.max_spacing, Duration::from_millis(3500));
        assert_eq!(config.backoff_basis, BackoffBasis::Attempt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_faithful_preset() {
        let config = QueueConfig::faithful();
        assert_eq!(config.backoff_basis, BackoffBasis::QueueDepth);
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.operation_timeout, None);
        assert!(config.validate().is_ok());
        assert!(config.allows_retry(u32::MAX - 1));
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let config = QueueConfig {
            max_backoff: Duration::from_secs(10),
            ..QueueConfig::default()
        };
        assert_eq!(config.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(8000));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_uncapped_backoff_saturates() {
        let config = QueueConfig::faithful();
        assert_eq!(config.backoff_delay(2), Duration::from_millis(4000));
        assert!(config.backoff_delay(500) >= Duration::from_secs(1 << 31));
    }

    #[test]
    fn test_spacing_delay_within_bounds() {
        let config = QueueConfig::default();
        for _ in 0..200 {
            let delay = config.spacing_delay();
            assert!(delay >= config.min_spacing && delay <= config.max_spacing);
        }
    }

    #[test]
    fn test_fixed_spacing() {
        let config = QueueConfig {
            min_spacing: Duration::from_millis(40),
            max_spacing: Duration::from_millis(40),
            ..QueueConfig::default()
        };
        assert_eq!(config.spacing_delay(), Duration::from_millis(40));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let inverted = QueueConfig {
            min_spacing: Duration::from_secs(5),
            max_spacing: Duration::from_secs(1),
            ..QueueConfig::default()
        };
        assert!(inverted.validate().is_err());

        let zero_attempts = QueueConfig {
            max_attempts: Some(0),
            ..QueueConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let zero_base = QueueConfig {
            backoff_base: Duration::ZERO,
            ..QueueConfig::default()
        };
        assert!(zero_base.validate().is_err());
    }

    #[test]
    fn test_retry_ceiling() {
        let config = QueueConfig {
            max_attempts: Some(3),
            ..QueueConfig::default()
        };
        assert!(config.allows_retry(1));
        assert!(config.allows_retry(2));
        assert!(!config.allows_retry(3));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_max_attempts("unlimited"), Some(None));
        assert_eq!(parse_max_attempts("0"), Some(None));
        assert_eq!(parse_max_attempts("7"), Some(Some(7)));
        assert_eq!(parse_max_attempts("seven"), None);

        assert_eq!("queue-depth".parse::<BackoffBasis>().unwrap(), BackoffBasis::QueueDepth);
        assert_eq!("Attempt".parse::<BackoffBasis>().unwrap(), BackoffBasis::Attempt);
        assert!("fibonacci".parse::<BackoffBasis>().is_err());
    }

    const ENV_VARS: [&str; 8] = [
        "HERALD_QUEUE_MIN_SPACING_MS",
        "HERALD_QUEUE_MAX_SPACING_MS",
        "HERALD_QUEUE_BACKOFF_BASE_MS",
        "HERALD_QUEUE_MAX_BACKOFF_MS",
        "HERALD_QUEUE_BACKOFF_BASIS",
        "HERALD_QUEUE_MAX_ATTEMPTS",
        "HERALD_QUEUE_TIMEOUT_MS",
        "HERALD_QUEUE_DEAD_LETTER_CAPACITY",
    ];

    /// Run `f` with exactly `vars` set among the queue variables
    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        for var in ENV_VARS {
            env::remove_var(var);
        }
        for (var, value) in vars {
            env::set_var(var, value);
        }
        let result = f();
        for var in ENV_VARS {
            env::remove_var(var);
        }
        result
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let config = with_env(&[], QueueConfig::from_env).unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        let config = with_env(
            &[
                ("HERALD_QUEUE_MIN_SPACING_MS", "200"),
                ("HERALD_QUEUE_MAX_SPACING_MS", " 400 "),
                ("HERALD_QUEUE_BACKOFF_BASIS", "queue-depth"),
                ("HERALD_QUEUE_MAX_ATTEMPTS", "unlimited"),
                ("HERALD_QUEUE_TIMEOUT_MS", "0"),
                ("HERALD_QUEUE_DEAD_LETTER_CAPACITY", "3"),
            ],
            QueueConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.min_spacing, Duration::from_millis(200));
        assert_eq!(config.max_spacing, Duration::from_millis(400));
        assert_eq!(config.backoff_base, Duration::from_millis(1000));
        assert_eq!(config.backoff_basis, BackoffBasis::QueueDepth);
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.operation_timeout, None);
        assert_eq!(config.dead_letter_capacity, 3);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_non_numeric() {
        let err = with_env(
            &[("HERALD_QUEUE_BACKOFF_BASE_MS", "soon")],
            QueueConfig::from_env,
        )
        .unwrap_err();

        match err {
            ConfigError::InvalidValue { var, value } => {
                assert_eq!(var, "HERALD_QUEUE_BACKOFF_BASE_MS");
                assert_eq!(value, "soon");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        let err = with_env(
            &[("HERALD_QUEUE_MAX_ATTEMPTS", "many")],
            QueueConfig::from_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    #[serial]
    fn test_from_env_validates_result() {
        let err = with_env(
            &[
                ("HERALD_QUEUE_MIN_SPACING_MS", "5000"),
                ("HERALD_QUEUE_MAX_SPACING_MS", "1000"),
            ],
            QueueConfig::from_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
