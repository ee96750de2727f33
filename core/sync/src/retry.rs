//! Backoff for rescheduling failed sync batches.
//!
//! This is the trigger source's policy, not the engine's: a cycle that
//! fails as a whole is re-triggered later, individual items never are.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reschedule policy, loaded from the `reschedule` section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reschedules allowed after the first failed cycle.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on the grown delay.
    pub max_delay: Duration,
    /// Growth factor per reschedule.
    pub backoff_multiplier: f64,
    /// Spread each delay over +/- 25%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before reschedule number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt.min(1024) as i32);
        let capped = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        };

        if self.jitter {
            capped.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady(initial: Duration) -> RetryConfig {
        RetryConfig {
            initial_delay: initial,
            jitter: false,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(6),
            ..steady(Duration::from_secs(1))
        };

        let delays: Vec<u64> = (0..5).map(|n| config.delay_for_attempt(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 6, 6]);
    }

    #[test]
    fn test_jittered_delay_stays_within_quarter() {
        let config = RetryConfig {
            jitter: true,
            ..steady(Duration::from_millis(1000))
        };

        for _ in 0..50 {
            let delay = config.delay_for_attempt(0).as_millis();
            assert!((750..=1250).contains(&delay));
        }
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{ "max_retries": 2 }"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay, RetryConfig::default().initial_delay);
    }
}
