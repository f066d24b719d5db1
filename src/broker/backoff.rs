use std::time::Duration;

use crate::error::EngineError;

/// Growth factor between consecutive reconnection delays.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Exponential backoff bounds for broker reconnection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry after a drop. Default: 1.5s.
    pub base: Duration,

    /// Upper bound on any single delay. Default: 15s.
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1500),
            cap: Duration::from_millis(15_000),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration) -> Result<Self, EngineError> {
        if base.is_zero() {
            return Err(EngineError::config("reconnect base delay must be positive"));
        }
        if cap < base {
            return Err(EngineError::config(format!(
                "reconnect cap ({}ms) is below base ({}ms)",
                cap.as_millis(),
                base.as_millis()
            )));
        }
        Ok(Self { base, cap })
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Result<Self, EngineError> {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    /// `min(base * 1.5^attempt, cap)`.
    ///
    /// `attempt` counts consecutive failed reconnection attempts since the last
    /// successful connection, so the first retry after a drop waits `base`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(64)).unwrap_or(64);
        let scaled = self.base.as_secs_f64() * BACKOFF_FACTOR.powi(exponent);
        let capped = scaled.min(self.cap.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base, Duration::from_millis(1500));
        assert_eq!(policy.cap, Duration::from_secs(15));
    }

    #[test]
    fn delay_grows_by_one_and_a_half() {
        let policy = ReconnectPolicy::from_millis(1000, 60_000).unwrap();

        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2250));
        assert_eq!(policy.delay_for(3), Duration::from_micros(3_375_000));
        assert_eq!(policy.delay_for(4), Duration::from_micros(5_062_500));
    }

    #[test]
    fn delay_is_capped() {
        let policy = ReconnectPolicy::default();

        // 1.5 * 1.5^6 = 17.08s, above the 15s cap
        assert_eq!(policy.delay_for(6), Duration::from_secs(15));
        assert_eq!(policy.delay_for(40), Duration::from_secs(15));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(15));
    }

    #[test]
    fn delay_never_decreases() {
        let policy = ReconnectPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..20 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            previous = delay;
        }
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(matches!(
            ReconnectPolicy::from_millis(5000, 1000),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            ReconnectPolicy::from_millis(0, 1000),
            Err(EngineError::Configuration(_))
        ));
    }
}
