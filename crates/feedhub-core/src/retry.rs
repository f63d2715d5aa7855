//! Transport-level attempt policy with exponential backoff and jitter.
//!
//! Attempts are owned by the endpoint. Operations never loop on their own;
//! whatever an endpoint raises after its last attempt is classified and
//! handed back to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy between two attempts of the same request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Uses a fixed delay between attempts.
    Fixed {
        #[serde(with = "millis")]
        delay: Duration,
    },
    /// Uses `base * (factor ^ attempt)`, capped at `max`.
    Exponential {
        #[serde(with = "millis")]
        base: Duration,
        factor: f64,
        #[serde(with = "millis")]
        max: Duration,
        /// Applies +/- 50% random jitter to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(250),
            factor: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay to wait before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let mut delay = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));

                if jitter {
                    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let spread = millis / 2;
                    let offset = fastrand::u64(0..=spread.saturating_mul(2));
                    delay = Duration::from_millis((millis - spread).saturating_add(offset));
                }

                delay
            }
        }
    }
}

/// How many times an endpoint may try to deliver one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptPolicy {
    /// Total attempts, including the first one. Zero is a configuration
    /// defect and surfaces as an INTERNAL failure.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Whether socket failures (reset, refused, timeout) are re-attempted.
    pub retry_on_socket: bool,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retry_on_socket: true,
        }
    }
}

impl AttemptPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Exactly one attempt, as used by deferred push closures.
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            retry_on_socket: false,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.retry_on_socket && attempt < self.max_attempts
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
