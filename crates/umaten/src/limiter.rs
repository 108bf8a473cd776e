//! Sliding-window admission limiter for hourly publish throughput.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60 * 60);

struct WindowState {
    max_per_window: u32,
    admissions: VecDeque<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.admissions.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Allows at most `max_per_hour` admissions in any trailing 60-minute window.
///
/// Admission timestamps are pruned lazily on every call; nothing runs in the
/// background.
pub struct RateLimiter {
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_per_hour: u32) -> Self {
        Self {
            state: Mutex::new(WindowState {
                max_per_window: max_per_hour,
                admissions: VecDeque::new(),
            }),
        }
    }

    /// Takes one slot from the current window if one is free.
    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    pub(crate) fn try_admit_at(&self, now: Instant) -> bool {
        self.with_state(|state| {
            state.prune(now);
            if state.admissions.len() >= state.max_per_window as usize {
                return false;
            }
            state.admissions.push_back(now);
            true
        })
    }

    /// Admissions are not returned to the window; kept so callers can pair
    /// every admit with a release.
    pub fn release(&self) {}

    /// Changes the hourly maximum. Admissions already in the window still count.
    pub fn set_max_per_hour(&self, max_per_hour: u32) {
        self.with_state(|state| state.max_per_window = max_per_hour);
    }

    pub fn max_per_hour(&self) -> u32 {
        self.with_state(|state| state.max_per_window)
    }

    /// Admissions inside the trailing window.
    pub fn admitted_in_window(&self) -> usize {
        let now = Instant::now();
        self.with_state(|state| {
            state.prune(now);
            state.admissions.len()
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut WindowState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Rate limiter lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_refuses_when_window_full() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();

        assert!(limiter.try_admit_at(start));
        assert!(limiter.try_admit_at(start + Duration::from_secs(1)));
        assert!(limiter.try_admit_at(start + Duration::from_secs(2)));
        assert!(!limiter.try_admit_at(start + Duration::from_secs(3)));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        assert!(limiter.try_admit_at(start));
        assert!(limiter.try_admit_at(start + Duration::from_secs(600)));
        assert!(!limiter.try_admit_at(start + Duration::from_secs(3599)));

        // The first admission leaves the window; only one slot frees up.
        assert!(limiter.try_admit_at(start + Duration::from_secs(3600)));
        assert!(!limiter.try_admit_at(start + Duration::from_secs(3601)));
        assert!(limiter.try_admit_at(start + Duration::from_secs(4200)));
    }

    #[test]
    fn test_sustained_oversupply_never_exceeds_rate() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        let mut admitted = Vec::new();

        // One attempt per minute for five hours.
        for minute in 0..300u64 {
            let at = start + Duration::from_secs(minute * 60);
            if limiter.try_admit_at(at) {
                admitted.push(at);
            }
        }

        for (i, t) in admitted.iter().enumerate() {
            let in_window = admitted[i..]
                .iter()
                .take_while(|other| other.duration_since(*t) < WINDOW)
                .count();
            assert!(in_window <= 5, "window starting at #{} holds {}", i, in_window);
        }
        assert_eq!(admitted.len(), 25);
    }

    #[test]
    fn test_lowering_max_applies_to_future_admissions() {
        let limiter = RateLimiter::new(10);
        let start = Instant::now();
        for i in 0..4 {
            assert!(limiter.try_admit_at(start + Duration::from_secs(i)));
        }

        limiter.set_max_per_hour(4);
        assert!(!limiter.try_admit_at(start + Duration::from_secs(10)));

        limiter.set_max_per_hour(5);
        assert!(limiter.try_admit_at(start + Duration::from_secs(11)));
        assert_eq!(limiter.max_per_hour(), 5);
    }

    #[test]
    fn test_release_does_not_free_slot() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_admit());
        limiter.release();
        assert!(!limiter.try_admit());
        assert_eq!(limiter.admitted_in_window(), 1);
    }

    #[test]
    fn test_concurrent_admissions_respect_max() {
        let limiter = Arc::new(RateLimiter::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.try_admit()).count())
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
