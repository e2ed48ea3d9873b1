use std::time::Duration;

/// Linear retry policy: attempt `i` (1-based) is followed by a wait of
/// `i * step` before the next try; the final attempt has no trailing wait.
/// Tests inject a zero step to run the full retry ladder instantly.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub step: Duration,
    pub max_attempts: usize,
}

impl LinearBackoff {
    pub fn new(step: Duration, max_attempts: usize) -> Self {
        Self { step, max_attempts }
    }

    /// The wait after a failed attempt, or `None` when attempts are spent.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.step * attempt as u32)
        }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ladder() {
        let backoff = LinearBackoff::default();
        assert_eq!(backoff.delay_after(1), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.delay_after(2), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.delay_after(3), None);
    }

    #[test]
    fn test_zero_step_still_bounds_attempts() {
        let backoff = LinearBackoff::new(Duration::ZERO, 3);
        assert_eq!(backoff.delay_after(2), Some(Duration::ZERO));
        assert_eq!(backoff.delay_after(3), None);
    }
}
