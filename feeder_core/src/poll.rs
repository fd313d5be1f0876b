//! Bounded polling, the only waiting primitive of the dispense path.

use std::time::Duration;

use feeder_traits::Clock;

/// Result of [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    TimedOut,
}

impl PollOutcome {
    #[inline]
    pub fn is_satisfied(self) -> bool {
        matches!(self, PollOutcome::Satisfied)
    }
}

/// Evaluate `predicate` every `interval` until it returns true or `timeout`
/// has elapsed on `clock`.
///
/// The predicate is checked before the deadline, so a zero timeout still gets
/// one evaluation. Each iteration sleeps on the clock, which is what advances
/// a manual clock in tests.
pub fn poll_until<F>(
    clock: &dyn Clock,
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
) -> PollOutcome
where
    F: FnMut() -> bool,
{
    let start = clock.now();
    let interval = interval.max(Duration::from_micros(1));
    loop {
        if predicate() {
            return PollOutcome::Satisfied;
        }
        if clock.now().saturating_duration_since(start) >= timeout {
            return PollOutcome::TimedOut;
        }
        clock.sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeder_traits::ManualClock;

    #[test]
    fn satisfied_immediately_does_not_sleep() {
        let clock = ManualClock::new();
        let out = poll_until(&clock, || true, Duration::from_secs(1), Duration::from_millis(1));
        assert_eq!(out, PollOutcome::Satisfied);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn times_out_after_deadline() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let out = poll_until(
            &clock,
            || {
                calls += 1;
                false
            },
            Duration::from_millis(10),
            Duration::from_millis(1),
        );
        assert_eq!(out, PollOutcome::TimedOut);
        assert_eq!(clock.elapsed(), Duration::from_millis(10));
        assert_eq!(calls, 11);
    }

    #[test]
    fn zero_timeout_evaluates_once() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let out = poll_until(
            &clock,
            || {
                calls += 1;
                false
            },
            Duration::ZERO,
            Duration::from_millis(1),
        );
        assert_eq!(out, PollOutcome::TimedOut);
        assert_eq!(calls, 1);
    }

    #[test]
    fn predicate_sees_clock_progress() {
        let clock = ManualClock::new();
        let start = clock.now();
        let out = poll_until(
            &clock,
            || clock.ms_since(start) >= 5,
            Duration::from_millis(100),
            Duration::from_millis(1),
        );
        assert!(out.is_satisfied());
        assert_eq!(clock.elapsed(), Duration::from_millis(5));
    }
}
