//! Runtime configuration for the dispense core.
//!
//! These are the structs the controller reads on the hot path. They are separate
//! from the TOML-deserialized config in `feeder_config`; see `conversions`.

use std::time::Duration;

use crate::event::Side;

/// Dispense cycle timing.
#[derive(Debug, Clone)]
pub struct DispenseCfg {
    /// Signed steps for one pellet-well cycle. Negative is the dispense direction.
    pub dispense_steps: i32,
    /// Pellet-only wait after a turn that produced nothing.
    pub inter_turn_delay_ms: u64,
    /// Pellet check run before each jam maneuver and between clear-jam sweeps.
    pub settle_check_ms: u64,
    /// Retrieval countdown window. Retrievals after this log as timed out.
    pub retrieval_window_ms: u64,
    /// Give up on an untouched pellet after this long, measured from dispense.
    pub stuck_timeout_ms: u64,
    /// Poll interval of the retrieval wait.
    pub retrieval_poll_us: u64,
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self {
            dispense_steps: -300,
            inter_turn_delay_ms: 1500,
            settle_check_ms: 250,
            retrieval_window_ms: 60_000,
            stuck_timeout_ms: 300_000,
            retrieval_poll_us: 1000,
        }
    }
}

impl DispenseCfg {
    pub fn retrieval_poll(&self) -> Duration {
        Duration::from_micros(self.retrieval_poll_us.max(1))
    }
}

/// Poke acceptance.
#[derive(Debug, Clone)]
pub struct PokeCfg {
    /// Ceiling on a single hold. A longer hold is treated as released.
    pub max_poke_ms: u64,
    /// Holds shorter than this are logged as short pokes.
    pub min_poke_ms: u64,
    /// Count pokes made while dispensing, waiting for retrieval or in a timeout.
    pub count_all_pokes: bool,
}

impl Default for PokeCfg {
    fn default() -> Self {
        Self {
            max_poke_ms: 20_000,
            min_poke_ms: 0,
            count_all_pokes: true,
        }
    }
}

/// Jam-clearing maneuver geometry.
#[derive(Debug, Clone)]
pub struct JamCfg {
    pub minor_steps: i32,
    pub vibrate_cycles: u32,
    pub vibrate_forward_steps: i32,
    pub vibrate_back_steps: i32,
    pub clear_base_iterations: u32,
    pub clear_jitter: u32,
    pub clear_ramp_steps: i32,
}

impl Default for JamCfg {
    fn default() -> Self {
        Self {
            minor_steps: 100,
            vibrate_cycles: 30,
            vibrate_forward_steps: 120,
            vibrate_back_steps: 60,
            clear_base_iterations: 21,
            clear_jitter: 20,
            clear_ramp_steps: 4,
        }
    }
}

/// Stepper speed.
#[derive(Debug, Clone)]
pub struct MotorCfg {
    pub steps_per_rev: u32,
    pub rpm: u32,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            steps_per_rev: 2038,
            rpm: 250,
        }
    }
}

impl MotorCfg {
    /// Time between micro-steps at the configured speed (at least 1 µs).
    pub fn step_interval(&self) -> Duration {
        let per_min = u64::from(self.steps_per_rev.max(1)) * u64::from(self.rpm.max(1));
        Duration::from_micros((60_000_000 / per_min).max(1))
    }
}

/// Sensor sampling.
#[derive(Debug, Clone)]
pub struct SensingCfg {
    pub debounce_us: u64,
    pub pellet_poll_us: u64,
    pub post_step_polls: u32,
}

impl Default for SensingCfg {
    fn default() -> Self {
        Self {
            debounce_us: 100,
            pellet_poll_us: 100,
            post_step_polls: 20,
        }
    }
}

/// Idle behaviour of the housekeeping tick.
#[derive(Debug, Clone)]
pub struct SleepCfg {
    pub enabled: bool,
    pub wake_interval_ms: u64,
}

impl Default for SleepCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_interval_ms: 5000,
        }
    }
}

/// Identity copied into every event record.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub library_version: String,
    pub session_type: String,
    pub device_number: u32,
    pub fr: u32,
    pub active_poke: Side,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            session_type: "Free_feeding".to_string(),
            device_number: 1,
            fr: 1,
            active_poke: Side::Left,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_step_interval_matches_250_rpm() {
        // 60e6 / (2038 * 250) = 117.7 µs
        assert_eq!(MotorCfg::default().step_interval(), Duration::from_micros(117));
    }

    #[test]
    fn step_interval_never_zero() {
        let fast = MotorCfg {
            steps_per_rev: u32::MAX,
            rpm: u32::MAX,
        };
        assert_eq!(fast.step_interval(), Duration::from_micros(1));
    }
}
