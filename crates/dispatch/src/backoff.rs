//! Retry policy and backoff calculations for timed-out dispatches

use hmc_config::DispatchConfig;
use std::time::Duration;

/// Retry configuration for timed-out agent calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff delay
    pub initial_delay: Duration,
    /// Maximum backoff delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, for tests and dry runs
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is the 1-based number of the retry about to be made.
#[must_use]
pub fn calculate_backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base_delay = {
        // Precision loss acceptable for backoff calculations
        #[allow(clippy::cast_precision_loss)]
        {
            policy.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64
        }
    };
    let max_delay = {
        #[allow(clippy::cast_precision_loss)]
        {
            policy.max_delay.as_millis().min(u128::from(u64::MAX)) as f64
        }
    };

    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let delay = (base_delay * policy.backoff_multiplier.powi(exponent)).min(max_delay);

    // Add jitter
    let jitter = delay * policy.jitter_factor * (rand::random::<f64>() - 0.5);
    let final_delay = {
        // Safe cast: max(0.0) ensures non-negative, round() handles fractional part
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            (delay + jitter).max(0.0).round() as u64
        }
    };

    Duration::from_millis(final_delay)
}
