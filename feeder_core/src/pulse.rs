//! Sync pulses on the BNC output.

use std::time::Duration;

use feeder_traits::{Clock, HwResult, SyncOutput};

/// `count` square pulses, `width_ms` high then `width_ms` low.
pub fn emit_sync_pulse(
    out: &mut dyn SyncOutput,
    clock: &dyn Clock,
    width_ms: u64,
    count: u32,
) -> HwResult<()> {
    let width = Duration::from_millis(width_ms);
    for _ in 0..count {
        out.set_level(true)?;
        clock.sleep(width);
        out.set_level(false)?;
        clock.sleep(width);
    }
    Ok(())
}

/// `reps` pulses of `width_ms` at `freq_hz`. A width longer than the period
/// leaves no low time between pulses rather than a negative one.
pub fn pulse_train(
    out: &mut dyn SyncOutput,
    clock: &dyn Clock,
    width_ms: u64,
    freq_hz: u32,
    reps: u32,
) -> HwResult<()> {
    let period_ms = 1000 / u64::from(freq_hz.max(1));
    let high = Duration::from_millis(width_ms);
    let low = Duration::from_millis(period_ms.saturating_sub(width_ms));
    for _ in 0..reps {
        out.set_level(true)?;
        clock.sleep(high);
        out.set_level(false)?;
        clock.sleep(low);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingSync;
    use feeder_traits::ManualClock;

    #[test]
    fn sync_pulse_is_symmetric() {
        let clock = ManualClock::new();
        let mut out = RecordingSync::default();
        emit_sync_pulse(&mut out, &clock, 10, 2).unwrap();
        assert_eq!(out.levels(), vec![true, false, true, false]);
        assert_eq!(clock.elapsed(), Duration::from_millis(40));
    }

    #[test]
    fn zero_count_is_silent() {
        let clock = ManualClock::new();
        let mut out = RecordingSync::default();
        emit_sync_pulse(&mut out, &clock, 10, 0).unwrap();
        assert!(out.levels().is_empty());
    }

    #[test]
    fn train_follows_frequency() {
        let clock = ManualClock::new();
        let mut out = RecordingSync::default();
        pulse_train(&mut out, &clock, 5, 20, 4).unwrap();
        assert_eq!(out.levels().len(), 8);
        assert_eq!(clock.elapsed(), Duration::from_millis(200));
    }

    #[test]
    fn overlong_width_clamps_low_time() {
        let clock = ManualClock::new();
        let mut out = RecordingSync::default();
        pulse_train(&mut out, &clock, 80, 20, 2).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(160));
    }
}
