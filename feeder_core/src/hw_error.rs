//! Typed view of the boxed errors that come back from the hardware seams.
//!
//! Motor, sync and indicator failures are best-effort in the dispense path, so
//! they are only ever logged; this gives the log line a stable category.

use crate::error::FeederError;

/// Map a trait-boundary error to a typed `FeederError`.
///
/// `HwError` (behind `hardware-errors`), then io and csv errors; anything else
/// keeps its message as a generic hardware error.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FeederError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<feeder_hardware::error::HwError>() {
            return match hw {
                feeder_hardware::error::HwError::Io(io) => FeederError::Io(io.to_string()),
                other => FeederError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return FeederError::Io(io.to_string());
    }
    if let Some(csv) = e.downcast_ref::<csv::Error>() {
        return FeederError::EventLog(csv.to_string());
    }
    FeederError::Hardware(e.to_string())
}
