#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the pellet feeder.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional; defaults reproduce the stock FED3 firmware
//!   constants, so an empty file is a valid configuration.
use serde::Deserialize;

/// BCM pin numbers for the Raspberry Pi backend.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub pellet_well: u8,
    pub left_poke: u8,
    pub right_poke: u8,
    pub motor_enable: u8,
    pub motor_coils: [u8; 4],
    /// BNC sync output; absent disables sync pulses on hardware.
    pub sync_out: Option<u8>,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            pellet_well: 17,
            left_poke: 27,
            right_poke: 22,
            motor_enable: 23,
            motor_coils: [5, 6, 13, 19],
            sync_out: Some(26),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivePoke {
    #[default]
    Left,
    Right,
}

/// Identity fields copied into every event-log row.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Device {
    pub number: u32,
    pub session_type: String,
    /// Fixed ratio of the running task; recorded only.
    pub fr: u32,
    pub active_poke: ActivePoke,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            number: 1,
            session_type: "Free_feeding".to_string(),
            fr: 1,
            active_poke: ActivePoke::Left,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispenseCfg {
    /// Signed steps for one pellet-well cycle; negative is the dispense direction.
    pub dispense_steps: i32,
    /// Pellet-only wait after a failed turn.
    pub inter_turn_delay_ms: u64,
    /// Pellet check run before each jam maneuver.
    pub settle_check_ms: u64,
    /// Countdown window for retrieval; later retrievals log as timed out.
    pub retrieval_window_ms: u64,
    /// Give-up time for a pellet that is never taken, measured from dispense.
    pub stuck_timeout_ms: u64,
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PokeCfg {
    /// Ceiling on a single poke's measured hold; longer holds count as released.
    pub max_poke_ms: u64,
    /// Holds shorter than this are tagged "Short".
    pub min_poke_ms: u64,
    /// Count pokes made during dispense, retrieval and timeouts.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JamCfg {
    pub minor_steps: i32,
    pub vibrate_cycles: u32,
    pub vibrate_forward_steps: i32,
    pub vibrate_back_steps: i32,
    /// Ramp length is `clear_base_iterations + rand(0..clear_jitter)`.
    pub clear_base_iterations: u32,
    pub clear_jitter: u32,
    /// Step increment per ramp iteration.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensingCfg {
    /// Gap between the two reads of the debounced pellet check.
    pub debounce_us: u64,
    /// Poll interval of the pellet-only waits.
    pub pellet_poll_us: u64,
    /// Sub-polls of the pellet watch after each micro-step.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SleepCfg {
    pub enabled: bool,
    /// Upper bound on one idle period; any input edge wakes earlier.
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

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Behavioural event log (CSV); absent mirrors events to tracing only.
    pub events_csv: Option<String>,
}

/// Parameters of the simulated rig used when no hardware is attached.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Seed for the jam-clearing ramp jitter.
    pub seed: u64,
    pub empty_turns: u32,
    pub drop_at_step: u32,
    /// Absent leaves pellets in the well until the stuck timeout.
    pub retrieve_after_ms: Option<u64>,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            seed: 0x00FE_D300,
            empty_turns: 2,
            drop_at_step: 150,
            retrieve_after_ms: Some(3000),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub device: Device,
    pub dispense: DispenseCfg,
    pub pokes: PokeCfg,
    pub jam: JamCfg,
    pub motor: MotorCfg,
    pub sensing: SensingCfg,
    pub sleep: SleepCfg,
    pub logging: Logging,
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Dispense
        if self.dispense.dispense_steps == 0 {
            eyre::bail!("dispense.dispense_steps must be non-zero");
        }
        if self.dispense.inter_turn_delay_ms > 60_000 {
            eyre::bail!("dispense.inter_turn_delay_ms is unreasonably large (>60s)");
        }
        if self.dispense.retrieval_window_ms == 0 {
            eyre::bail!("dispense.retrieval_window_ms must be >= 1");
        }
        if self.dispense.stuck_timeout_ms < self.dispense.retrieval_window_ms {
            eyre::bail!("dispense.stuck_timeout_ms must be >= dispense.retrieval_window_ms");
        }
        if self.dispense.stuck_timeout_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("dispense.stuck_timeout_ms is unreasonably large (>24h)");
        }
        if self.dispense.retrieval_poll_us == 0 {
            eyre::bail!("dispense.retrieval_poll_us must be >= 1");
        }

        // Pokes
        if self.pokes.max_poke_ms == 0 {
            eyre::bail!("pokes.max_poke_ms must be >= 1");
        }
        if self.pokes.min_poke_ms > self.pokes.max_poke_ms {
            eyre::bail!("pokes.min_poke_ms must be <= pokes.max_poke_ms");
        }

        // Jam
        if self.jam.minor_steps == 0 {
            eyre::bail!("jam.minor_steps must be non-zero");
        }
        if self.jam.vibrate_forward_steps <= 0 || self.jam.vibrate_back_steps <= 0 {
            eyre::bail!("jam.vibrate_forward_steps and jam.vibrate_back_steps must be > 0");
        }
        if self.jam.clear_ramp_steps <= 0 {
            eyre::bail!("jam.clear_ramp_steps must be > 0");
        }
        if self.jam.clear_base_iterations == 0 {
            eyre::bail!("jam.clear_base_iterations must be >= 1");
        }

        // Motor
        if self.motor.steps_per_rev == 0 {
            eyre::bail!("motor.steps_per_rev must be > 0");
        }
        if self.motor.rpm == 0 || self.motor.rpm > 1000 {
            eyre::bail!("motor.rpm must be in [1, 1000]");
        }

        // Sensing
        if self.sensing.pellet_poll_us == 0 {
            eyre::bail!("sensing.pellet_poll_us must be >= 1");
        }
        if self.sensing.debounce_us > 10_000 {
            eyre::bail!("sensing.debounce_us is unreasonably large (>10ms)");
        }

        // Sleep
        if self.sleep.enabled && self.sleep.wake_interval_ms == 0 {
            eyre::bail!("sleep.wake_interval_ms must be >= 1 when sleep is enabled");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Pins
        let mut pins = vec![
            self.pins.pellet_well,
            self.pins.left_poke,
            self.pins.right_poke,
            self.pins.motor_enable,
        ];
        pins.extend(self.pins.motor_coils);
        pins.extend(self.pins.sync_out);
        let mut sorted = pins.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != pins.len() {
            eyre::bail!("pins must be distinct");
        }

        Ok(())
    }
}
