use std::time::Duration;

use rand::Rng;

/// Chooses the pause before the next scrape attempt.
pub trait DelayPolicy: Send + Sync {
    /// `attempt` is the number of attempts already made.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Uniformly random pause in `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct RandomDelay {
    min: Duration,
    max: Duration,
}

impl RandomDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

impl DelayPolicy for RandomDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// No pause at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayPolicy for NoDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
