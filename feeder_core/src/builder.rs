//! Type-state builder for the boxed `Feeder` controller.
//!
//! `build()` is only available once inputs and a motor are provided;
//! `try_build()` is always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use feeder_traits::{Clock, Indicators, Inputs, Motor, MonotonicClock, SyncOutput};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

use crate::config::{DispenseCfg, JamCfg, MotorCfg, PokeCfg, SensingCfg, SessionInfo, SleepCfg};
use crate::controller::{DispenseController, DispenseSession, DispenseState};
use crate::display::{StatusDisplay, TracingDisplay};
use crate::error::{BuildError, Result};
use crate::interrupts::InterruptFlags;
use crate::jam::JamRecovery;
use crate::logger::{EventSink, TracingSink};
use crate::motor::MotorDriver;
use crate::recorder::Recorder;
use crate::sensors::SensorPoller;

/// Controller over boxed hardware, as assembled by [`FeederBuilder`].
pub type Feeder = DispenseController<Box<dyn Inputs + Send>, Box<dyn Motor + Send>>;

impl Feeder {
    pub fn builder() -> FeederBuilder<Missing, Missing> {
        FeederBuilder::default()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Everything except the two required parts.
#[derive(Default)]
struct Parts {
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    sink: Option<Box<dyn EventSink + Send>>,
    display: Option<Box<dyn StatusDisplay + Send>>,
    sync: Option<Box<dyn SyncOutput + Send>>,
    indicators: Option<Box<dyn Indicators + Send>>,
    rng: Option<Box<dyn RngCore + Send>>,
    flags: Option<Arc<InterruptFlags>>,
    dispense: Option<DispenseCfg>,
    pokes: Option<PokeCfg>,
    jam: Option<JamCfg>,
    motor_cfg: Option<MotorCfg>,
    sensing: Option<SensingCfg>,
    sleep: Option<SleepCfg>,
    session: Option<SessionInfo>,
}

pub struct FeederBuilder<I, M> {
    inputs: Option<Box<dyn Inputs + Send>>,
    motor: Option<Box<dyn Motor + Send>>,
    parts: Parts,
    _i: PhantomData<I>,
    _m: PhantomData<M>,
}

impl Default for FeederBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            inputs: None,
            motor: None,
            parts: Parts::default(),
            _i: PhantomData,
            _m: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(
    dispense: &DispenseCfg,
    pokes: &PokeCfg,
    jam: &JamCfg,
    motor: &MotorCfg,
    sensing: &SensingCfg,
) -> Result<()> {
    if dispense.dispense_steps == 0 {
        return Err(invalid("dispense_steps must be non-zero"));
    }
    if dispense.retrieval_poll_us == 0 {
        return Err(invalid("retrieval_poll_us must be >= 1"));
    }
    if dispense.stuck_timeout_ms < dispense.retrieval_window_ms {
        return Err(invalid("stuck_timeout_ms must be >= retrieval_window_ms"));
    }
    if pokes.max_poke_ms == 0 {
        return Err(invalid("max_poke_ms must be >= 1"));
    }
    if pokes.min_poke_ms > pokes.max_poke_ms {
        return Err(invalid("min_poke_ms must be <= max_poke_ms"));
    }
    if jam.clear_ramp_steps <= 0 {
        return Err(invalid("clear_ramp_steps must be > 0"));
    }
    if motor.steps_per_rev == 0 || motor.rpm == 0 {
        return Err(invalid("motor speed must be > 0"));
    }
    if sensing.pellet_poll_us == 0 {
        return Err(invalid("pellet_poll_us must be >= 1"));
    }
    Ok(())
}

/// Seed for the jam ramp jitter when none is given.
fn default_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl<I, M> FeederBuilder<I, M> {
    /// Fallible build available in any type-state; returns a typed error for missing pieces.
    pub fn try_build(self) -> Result<Feeder> {
        let inputs = self
            .inputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInputs))?;
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let p = self.parts;

        let dispense = p.dispense.unwrap_or_default();
        let pokes = p.pokes.unwrap_or_default();
        let jam = p.jam.unwrap_or_default();
        let motor_cfg = p.motor_cfg.unwrap_or_default();
        let sensing = p.sensing.unwrap_or_default();
        validate(&dispense, &pokes, &jam, &motor_cfg, &sensing)?;

        let clock = p.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let epoch = clock.now();
        let rng = p
            .rng
            .unwrap_or_else(|| Box::new(ChaCha8Rng::seed_from_u64(default_seed())));

        Ok(DispenseController {
            sensors: SensorPoller::new(
                inputs,
                Arc::clone(&clock),
                sensing,
                pokes.max_poke_ms,
                epoch,
            ),
            motor: MotorDriver::new(motor, Arc::clone(&clock), motor_cfg.step_interval()),
            jam: JamRecovery::new(jam, rng),
            recorder: Recorder::new(
                p.sink.unwrap_or_else(|| Box::new(TracingSink)),
                p.display.unwrap_or_else(|| Box::new(TracingDisplay::default())),
                p.session.unwrap_or_default(),
                Arc::clone(&clock),
                epoch,
            ),
            sync: p.sync,
            indicators: p.indicators,
            flags: p.flags.unwrap_or_default(),
            clock,
            dispense,
            pokes,
            sleep: p.sleep.unwrap_or_default(),
            session: DispenseSession::default(),
            last_pellet: None,
            state: DispenseState::Idle,
        })
    }
}

/// Chainable setters that do not affect type-state.
impl<I, M> FeederBuilder<I, M> {
    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.parts.clock = Some(clock);
        self
    }
    /// Event-log sink; defaults to `TracingSink`.
    pub fn with_sink(mut self, sink: impl EventSink + Send + 'static) -> Self {
        self.parts.sink = Some(Box::new(sink));
        self
    }
    pub fn with_display(mut self, display: impl StatusDisplay + Send + 'static) -> Self {
        self.parts.display = Some(Box::new(display));
        self
    }
    pub fn with_sync_output(mut self, sync: impl SyncOutput + Send + 'static) -> Self {
        self.parts.sync = Some(Box::new(sync));
        self
    }
    pub fn with_indicators(mut self, indicators: impl Indicators + Send + 'static) -> Self {
        self.parts.indicators = Some(Box::new(indicators));
        self
    }
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.parts.rng = Some(Box::new(rng));
        self
    }
    /// Deterministic jam ramp jitter.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(ChaCha8Rng::seed_from_u64(seed))
    }
    /// Share flags with the interrupt handlers (see `interrupts::attach`).
    pub fn with_flags(mut self, flags: Arc<InterruptFlags>) -> Self {
        self.parts.flags = Some(flags);
        self
    }
    pub fn with_dispense(mut self, cfg: DispenseCfg) -> Self {
        self.parts.dispense = Some(cfg);
        self
    }
    pub fn with_pokes(mut self, cfg: PokeCfg) -> Self {
        self.parts.pokes = Some(cfg);
        self
    }
    pub fn with_jam(mut self, cfg: JamCfg) -> Self {
        self.parts.jam = Some(cfg);
        self
    }
    pub fn with_motor_cfg(mut self, cfg: MotorCfg) -> Self {
        self.parts.motor_cfg = Some(cfg);
        self
    }
    pub fn with_sensing(mut self, cfg: SensingCfg) -> Self {
        self.parts.sensing = Some(cfg);
        self
    }
    pub fn with_sleep(mut self, cfg: SleepCfg) -> Self {
        self.parts.sleep = Some(cfg);
        self
    }
    pub fn with_session(mut self, info: SessionInfo) -> Self {
        self.parts.session = Some(info);
        self
    }
    /// Apply every runtime section of a file config.
    pub fn with_config(self, cfg: &feeder_config::Config) -> Self {
        self.with_dispense((&cfg.dispense).into())
            .with_pokes((&cfg.pokes).into())
            .with_jam((&cfg.jam).into())
            .with_motor_cfg((&cfg.motor).into())
            .with_sensing((&cfg.sensing).into())
            .with_sleep((&cfg.sleep).into())
            .with_session((&cfg.device).into())
    }
}

// Setters that advance type-state
impl<M> FeederBuilder<Missing, M> {
    pub fn with_inputs(self, inputs: impl Inputs + Send + 'static) -> FeederBuilder<Set, M> {
        FeederBuilder {
            inputs: Some(Box::new(inputs)),
            motor: self.motor,
            parts: self.parts,
            _i: PhantomData,
            _m: PhantomData,
        }
    }
}

impl<I> FeederBuilder<I, Missing> {
    pub fn with_motor(self, motor: impl Motor + Send + 'static) -> FeederBuilder<I, Set> {
        FeederBuilder {
            inputs: self.inputs,
            motor: Some(Box::new(motor)),
            parts: self.parts,
            _i: PhantomData,
            _m: PhantomData,
        }
    }
}

impl FeederBuilder<Set, Set> {
    /// Validate and build. Only available when inputs and motor are set.
    pub fn build(self) -> Result<Feeder> {
        self.try_build()
    }
}
