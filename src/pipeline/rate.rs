use std::{
    sync::{
        Mutex,
        MutexGuard,
    },
    time::Duration,
};

const MAX_BACKOFF_SECS: f64 = 10.0;

#[derive(Debug, Default, Clone, Copy)]
struct RateSignals {
    consecutive_success: u32,
    consecutive_failures: u32,
    last_throttled: bool,
    adjustments: u64,
}

/// Aggregates fetch outcomes from every concurrent row into one shared
/// backoff value. Sustained throttling slows the whole pipeline down by
/// stretching the delay rows take before starting work; the concurrency
/// limiter itself is never resized mid-flight, because operations already
/// holding a slot make that unsafe.
#[derive(Debug, Default)]
pub struct RateSignalTracker {
    signals: Mutex<RateSignals>,
}

impl RateSignalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one remote outcome into the shared state. A 429 counts as a
    /// throttle; any status below 400 with success clears the failure streak;
    /// everything else is a plain failure.
    pub fn record_outcome(&self, status: Option<u16>, is_success: bool) {
        let mut signals = self.lock();

        match status {
            Some(429) => {
                signals.consecutive_success = 0;
                signals.consecutive_failures += 1;
                signals.last_throttled = true;
                signals.adjustments += 1;
            }
            Some(code) if code < 400 && is_success => {
                signals.consecutive_failures = 0;
                signals.consecutive_success += 1;
                signals.last_throttled = false;
            }
            _ => {
                if !is_success {
                    signals.consecutive_success = 0;
                    signals.consecutive_failures += 1;
                    signals.last_throttled = false;
                }
            }
        }
    }

    /// Exponential backoff from the failure streak: zero while healthy, then
    /// 0.5s doubling per consecutive failure, capped at 10s. Every row reads
    /// this right before starting work.
    pub fn current_backoff(&self) -> Duration {
        let failures = self.lock().consecutive_failures;
        if failures == 0 {
            return Duration::ZERO;
        }

        let secs = (0.5 * 2f64.powi((failures - 1).min(5) as i32)).min(MAX_BACKOFF_SECS);
        Duration::from_secs_f64(secs)
    }

    /// How many throttle responses were absorbed; surfaced in the summary.
    pub fn adjustments(&self) -> u64 {
        self.lock().adjustments
    }

    pub fn last_throttled(&self) -> bool {
        self.lock().last_throttled
    }

    /// Back to neutral at pipeline start.
    pub fn reset(&self) {
        *self.lock() = RateSignals::default();
    }

    fn lock(&self) -> MutexGuard<'_, RateSignals> {
        self.signals.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_zero_while_healthy() {
        let tracker = RateSignalTracker::new();
        assert_eq!(tracker.current_backoff(), Duration::ZERO);

        tracker.record_outcome(Some(200), true);
        assert_eq!(tracker.current_backoff(), Duration::ZERO);
    }

    #[test]
    fn backoff_rises_monotonically_under_throttling() {
        let tracker = RateSignalTracker::new();
        let mut previous = Duration::ZERO;

        for _ in 0..8 {
            tracker.record_outcome(Some(429), false);
            let backoff = tracker.current_backoff();
            assert!(backoff >= previous);
            previous = backoff;
        }

        assert_eq!(previous, Duration::from_secs_f64(10.0));
    }

    #[test]
    fn backoff_sequence_doubles_from_half_a_second() {
        let tracker = RateSignalTracker::new();
        let expected = [0.5, 1.0, 2.0, 4.0, 8.0, 10.0, 10.0];

        for secs in expected {
            tracker.record_outcome(None, false);
            assert_eq!(tracker.current_backoff(), Duration::from_secs_f64(secs));
        }
    }

    #[test]
    fn one_success_clears_the_failure_streak() {
        let tracker = RateSignalTracker::new();
        tracker.record_outcome(Some(429), false);
        tracker.record_outcome(Some(429), false);
        assert!(tracker.current_backoff() > Duration::ZERO);
        assert!(tracker.last_throttled());

        tracker.record_outcome(Some(200), true);
        assert_eq!(tracker.current_backoff(), Duration::ZERO);
        assert!(!tracker.last_throttled());
    }

    #[test]
    fn throttles_count_as_adjustments() {
        let tracker = RateSignalTracker::new();
        tracker.record_outcome(Some(429), false);
        tracker.record_outcome(Some(200), true);
        tracker.record_outcome(Some(429), false);

        assert_eq!(tracker.adjustments(), 2);
    }

    #[test]
    fn reset_returns_to_neutral() {
        let tracker = RateSignalTracker::new();
        tracker.record_outcome(Some(429), false);
        tracker.reset();

        assert_eq!(tracker.current_backoff(), Duration::ZERO);
        assert_eq!(tracker.adjustments(), 0);
    }
}
