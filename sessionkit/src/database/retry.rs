use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use scylla::transport::retry_policy::{
    QueryInfo, RetryDecision, RetryPolicy as DriverRetryPolicy, RetrySession,
};

/// Exponential backoff retry rules.
///
/// Attached to a cluster configuration it governs how the driver retries
/// individual queries. The reconnection supervisor reuses the same delay
/// schedule when it is configured to back off between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub num_retries: u32,
    #[serde(with = "crate::config::millis")]
    pub min: Duration,
    #[serde(with = "crate::config::millis")]
    pub max: Duration,
    #[serde(default = "default_base")]
    pub exponential_base: f64,
}

fn default_base() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(5), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn exponential(num_retries: u32, min: Duration, max: Duration) -> Self {
        Self {
            num_retries,
            min,
            max,
            exponential_base: default_base(),
        }
    }

    /// A policy that never retries.
    pub fn never() -> Self {
        Self::exponential(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (zero-based), capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.powi(attempt.min(63) as i32);
        let delay_nanos = self.min.as_nanos() as f64 * factor;
        if !delay_nanos.is_finite() || delay_nanos >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(delay_nanos as u64)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.min > self.max {
            return Err(format!(
                "retry policy min delay {:?} exceeds max delay {:?}",
                self.min, self.max
            ));
        }
        if self.exponential_base < 1.0 {
            return Err(format!(
                "retry policy exponential base {} must be >= 1.0",
                self.exponential_base
            ));
        }
        Ok(())
    }

    /// Driver-side rendition of this policy.
    ///
    /// The driver decides retries synchronously, so only the retry budget
    /// carries over; the delay schedule is not applied between driver retries.
    pub fn to_driver_policy(&self) -> Arc<dyn DriverRetryPolicy> {
        Arc::new(BoundedRetryPolicy {
            num_retries: self.num_retries,
        })
    }
}

#[derive(Debug, Clone)]
struct BoundedRetryPolicy {
    num_retries: u32,
}

impl DriverRetryPolicy for BoundedRetryPolicy {
    fn new_session(&self) -> Box<dyn RetrySession> {
        Box::new(BoundedRetrySession {
            num_retries: self.num_retries,
            attempts: 0,
        })
    }

    fn clone_boxed(&self) -> Box<dyn DriverRetryPolicy> {
        Box::new(self.clone())
    }
}

#[derive(Debug)]
struct BoundedRetrySession {
    num_retries: u32,
    attempts: u32,
}

impl RetrySession for BoundedRetrySession {
    fn decide_should_retry(&mut self, query_info: QueryInfo) -> RetryDecision {
        // Non-idempotent statements may already have been applied.
        if !query_info.is_idempotent || self.attempts >= self.num_retries {
            return RetryDecision::DontRetry;
        }
        self.attempts += 1;
        RetryDecision::RetryNextNode(None)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}
