//! `From` implementations bridging `feeder_config` types to `feeder_core` types.

use crate::config::{DispenseCfg, JamCfg, MotorCfg, PokeCfg, SensingCfg, SessionInfo, SleepCfg};
use crate::event::Side;

impl From<&feeder_config::DispenseCfg> for DispenseCfg {
    fn from(c: &feeder_config::DispenseCfg) -> Self {
        Self {
            dispense_steps: c.dispense_steps,
            inter_turn_delay_ms: c.inter_turn_delay_ms,
            settle_check_ms: c.settle_check_ms,
            retrieval_window_ms: c.retrieval_window_ms,
            stuck_timeout_ms: c.stuck_timeout_ms,
            retrieval_poll_us: c.retrieval_poll_us,
        }
    }
}

impl From<&feeder_config::PokeCfg> for PokeCfg {
    fn from(c: &feeder_config::PokeCfg) -> Self {
        Self {
            max_poke_ms: c.max_poke_ms,
            min_poke_ms: c.min_poke_ms,
            count_all_pokes: c.count_all_pokes,
        }
    }
}

impl From<&feeder_config::JamCfg> for JamCfg {
    fn from(c: &feeder_config::JamCfg) -> Self {
        Self {
            minor_steps: c.minor_steps,
            vibrate_cycles: c.vibrate_cycles,
            vibrate_forward_steps: c.vibrate_forward_steps,
            vibrate_back_steps: c.vibrate_back_steps,
            clear_base_iterations: c.clear_base_iterations,
            clear_jitter: c.clear_jitter,
            clear_ramp_steps: c.clear_ramp_steps,
        }
    }
}

impl From<&feeder_config::MotorCfg> for MotorCfg {
    fn from(c: &feeder_config::MotorCfg) -> Self {
        Self {
            steps_per_rev: c.steps_per_rev,
            rpm: c.rpm,
        }
    }
}

impl From<&feeder_config::SensingCfg> for SensingCfg {
    fn from(c: &feeder_config::SensingCfg) -> Self {
        Self {
            debounce_us: c.debounce_us,
            pellet_poll_us: c.pellet_poll_us,
            post_step_polls: c.post_step_polls,
        }
    }
}

impl From<&feeder_config::SleepCfg> for SleepCfg {
    fn from(c: &feeder_config::SleepCfg) -> Self {
        Self {
            enabled: c.enabled,
            wake_interval_ms: c.wake_interval_ms,
        }
    }
}

impl From<feeder_config::ActivePoke> for Side {
    fn from(p: feeder_config::ActivePoke) -> Self {
        match p {
            feeder_config::ActivePoke::Left => Side::Left,
            feeder_config::ActivePoke::Right => Side::Right,
        }
    }
}

impl From<&feeder_config::Device> for SessionInfo {
    fn from(c: &feeder_config::Device) -> Self {
        Self {
            session_type: c.session_type.clone(),
            device_number: c.number,
            fr: c.fr,
            active_poke: c.active_poke.into(),
            ..SessionInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_with_config_crate() {
        let file = feeder_config::Config::default();
        let d = DispenseCfg::from(&file.dispense);
        let rt = DispenseCfg::default();
        assert_eq!(d.dispense_steps, rt.dispense_steps);
        assert_eq!(d.stuck_timeout_ms, rt.stuck_timeout_ms);
        assert_eq!(JamCfg::from(&file.jam).clear_jitter, JamCfg::default().clear_jitter);
        assert_eq!(
            SensingCfg::from(&file.sensing).post_step_polls,
            SensingCfg::default().post_step_polls
        );
    }

    #[test]
    fn device_maps_active_poke() {
        let dev = feeder_config::Device {
            active_poke: feeder_config::ActivePoke::Right,
            ..feeder_config::Device::default()
        };
        assert_eq!(SessionInfo::from(&dev).active_poke, Side::Right);
    }
}
