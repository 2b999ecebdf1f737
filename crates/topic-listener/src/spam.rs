//! Rate limit for urgent mentions

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Allows at most one urgent mention per window, across all connections
#[derive(Debug)]
pub struct SpamGuard {
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl SpamGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(None),
        }
    }

    /// Claim the mention for now; `false` means it must be suppressed
    pub fn try_fire(&self) -> bool {
        self.try_fire_at(Instant::now())
    }

    /// Claim the mention at `now`.
    ///
    /// Check and update happen under one lock so concurrent urgent events
    /// cannot both fire.
    pub fn try_fire_at(&self, now: Instant) -> bool {
        let mut last = self
            .last_fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_suppresses_within_window() {
        let guard = SpamGuard::new(WINDOW);
        let start = Instant::now();

        let fired = [
            guard.try_fire_at(start),
            guard.try_fire_at(start + Duration::from_secs(10)),
        ];
        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
    }

    #[test]
    fn test_fires_again_after_window() {
        let guard = SpamGuard::new(WINDOW);
        let start = Instant::now();

        assert!(guard.try_fire_at(start));
        assert!(guard.try_fire_at(start + Duration::from_secs(301)));
    }

    #[test]
    fn test_suppressed_event_does_not_extend_window() {
        let guard = SpamGuard::new(WINDOW);
        let start = Instant::now();

        assert!(guard.try_fire_at(start));
        assert!(!guard.try_fire_at(start + Duration::from_secs(200)));
        assert!(guard.try_fire_at(start + Duration::from_secs(300)));
    }

    #[test]
    fn test_concurrent_claims_fire_once() {
        let guard = Arc::new(SpamGuard::new(WINDOW));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_fire_at(now))
            })
            .collect();

        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|f| *f)
            .count();
        assert_eq!(fired, 1);
    }
}
