use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Recovery policy for a connection lost while live
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl ReconnectPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self> {
        if multiplier <= 1.0 {
            return Err(DomainError::InvalidBackoffMultiplier);
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            multiplier,
        })
    }

    /// Recovery is skipped entirely; a lost connection ends the broadcast
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay before the given 1-based attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = ReconnectPolicy::new(
            10,
            Duration::from_secs(1),
            Duration::from_secs(10),
            2.0,
        )
        .unwrap();
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_invalid_multiplier() {
        let result = ReconnectPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30), 1.0);
        assert!(matches!(result, Err(DomainError::InvalidBackoffMultiplier)));
    }

    #[test]
    fn test_disabled_policy() {
        let policy = ReconnectPolicy::disabled();
        assert!(!policy.is_enabled());
        assert_eq!(policy.max_attempts(), 0);
    }
}
