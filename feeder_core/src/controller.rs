//! The dispense state machine (`DispenseController`).
//!
//! One `feed()` runs to completion: rotate, escalate through jam maneuvers on
//! failed turns, wait for the pellet to be taken, log it. Pokes are captured
//! between micro-steps and during the retrieval wait. Interrupt handlers only
//! flip flags in [`InterruptFlags`]; everything else happens here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use feeder_traits::{Clock, Indicators, InputLine, Inputs, Motor, PinState, SyncOutput};
use rand_core::RngCore;

use crate::config::{DispenseCfg, PokeCfg, SleepCfg};
use crate::event::{Counters, PokeContext, PokeEvent, RetrievalTime, Side};
use crate::hw_error::map_hw_error;
use crate::interrupts::InterruptFlags;
use crate::jam::{Carousel, JamRecovery, JamTier};
use crate::motor::{MotorDriver, StepObserver};
use crate::poll::poll_until;
use crate::pulse::emit_sync_pulse;
use crate::recorder::{PelletFields, Recorder};
use crate::sensors::SensorPoller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseState {
    Idle,
    Rotating,
    TurnExhausted,
    JamCheck,
    PelletSensed,
    AwaitingRetrieval,
    Done,
}

/// Per-feed bookkeeping. Reset at the start of every `feed()`.
#[derive(Debug, Clone, Default)]
pub struct DispenseSession {
    pub turns_attempted: u32,
    pub pellet_available: bool,
    pub dispense_time: Option<Instant>,
    pub jam_history: Vec<JamTier>,
}

/// How the retrieval wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Taken `after_ms` after dispense.
    Retrieved { after_ms: u64 },
    /// Still in the well at the stuck timeout; the wait was abandoned.
    Stuck,
}

impl RetrievalOutcome {
    fn log_time(self, window_ms: u64) -> RetrievalTime {
        match self {
            RetrievalOutcome::Retrieved { after_ms } if after_ms < window_ms => {
                RetrievalTime::Millis(after_ms)
            }
            _ => RetrievalTime::TimedOut,
        }
    }
}

/// Summary of one completed `feed()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedReport {
    /// Dispense attempts for this pellet (failed turns + 1).
    pub motor_turns: u32,
    pub jam_history: Vec<JamTier>,
    pub retrieval: RetrievalOutcome,
    pub inter_pellet_s: Option<f64>,
    /// Motor command errors during this feed.
    pub motor_faults: u32,
    pub counts: Counters,
}

/// Poke capture between micro-steps plus the post-step pellet watch.
struct PokeInterleave<'a, I: Inputs> {
    sensors: &'a mut SensorPoller<I>,
    recorder: &'a mut Recorder,
    count: bool,
}

impl<I: Inputs> StepObserver for PokeInterleave<'_, I> {
    fn before_step(&mut self) {
        for side in Side::BOTH {
            if self.sensors.is_poke_active(side) {
                let poke = self.sensors.capture_poke(side, PokeContext::DuringDispense);
                self.recorder.record_poke(&poke, self.count);
            }
        }
    }

    fn after_step(&mut self) -> bool {
        self.sensors.watch_after_step()
    }
}

/// The mechanism as seen by the jam maneuvers.
struct JamRig<'a, I: Inputs, M: Motor> {
    sensors: &'a mut SensorPoller<I>,
    motor: &'a mut MotorDriver<M>,
    recorder: &'a mut Recorder,
    count: bool,
    settle_ms: u64,
}

impl<I: Inputs, M: Motor> Carousel for JamRig<'_, I, M> {
    fn rotate(&mut self, steps: i32) -> bool {
        let mut watch = PokeInterleave {
            sensors: &mut *self.sensors,
            recorder: &mut *self.recorder,
            count: self.count,
        };
        self.motor.rotate(steps, &mut watch)
    }

    fn settle_check(&mut self) -> bool {
        self.sensors.wait_for_pellet(self.settle_ms)
    }

    fn show_jam_notice(&mut self) {
        self.recorder.display().render_jam_notice();
    }

    fn clear_jam_notice(&mut self) {
        self.recorder.display().clear_transient_notice();
    }
}

pub struct DispenseController<I: Inputs, M: Motor> {
    pub(crate) sensors: SensorPoller<I>,
    pub(crate) motor: MotorDriver<M>,
    pub(crate) jam: JamRecovery<Box<dyn RngCore + Send>>,
    pub(crate) recorder: Recorder,
    pub(crate) sync: Option<Box<dyn SyncOutput + Send>>,
    pub(crate) indicators: Option<Box<dyn Indicators + Send>>,
    pub(crate) flags: Arc<InterruptFlags>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) dispense: DispenseCfg,
    pub(crate) pokes: PokeCfg,
    pub(crate) sleep: SleepCfg,
    pub(crate) session: DispenseSession,
    pub(crate) last_pellet: Option<Instant>,
    pub(crate) state: DispenseState,
}

impl<I: Inputs, M: Motor> core::fmt::Debug for DispenseController<I, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispenseController")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("counts", &self.recorder.counts())
            .field("motor_faults", &self.motor.faults())
            .finish()
    }
}

impl<I: Inputs, M: Motor> DispenseController<I, M> {
    /// Dispense one pellet and wait for it to be taken (or given up on).
    ///
    /// Never gives up on a turn that produced nothing: an empty or jammed
    /// carousel is retried until a pellet arrives. `pulse_ms > 0` emits one
    /// sync pulse of that width when the pellet is logged.
    pub fn feed(&mut self, pulse_ms: u64, clear_indicators: bool) -> FeedReport {
        self.session = DispenseSession::default();
        let faults_before = self.motor.faults();
        self.transition(DispenseState::Rotating);

        loop {
            let dispensed = self.rotate_interleaved(self.dispense.dispense_steps);
            if clear_indicators {
                self.lights_off();
            }
            if dispensed {
                break;
            }

            self.transition(DispenseState::TurnExhausted);
            // the turn counts even when the pellet lands after the motor stops
            let landed = self.sensors.wait_for_pellet(self.dispense.inter_turn_delay_ms);
            self.session.turns_attempted += 1;
            if landed {
                tracing::debug!(turn = self.session.turns_attempted, "pellet landed after the turn");
                break;
            }
            let tier = JamTier::for_turn(self.session.turns_attempted);
            tracing::debug!(turn = self.session.turns_attempted, %tier, "turn produced no pellet");

            if tier != JamTier::None {
                self.transition(DispenseState::JamCheck);
                self.session.jam_history.push(tier);
                if self.run_jam(tier) {
                    break;
                }
            }
            self.transition(DispenseState::Rotating);
        }

        self.transition(DispenseState::PelletSensed);
        self.motor.release();
        let dispense_time = self.clock.now();
        self.session.dispense_time = Some(dispense_time);
        self.session.pellet_available = true;
        self.flags.set_pellet_available(true);

        self.transition(DispenseState::AwaitingRetrieval);
        let retrieval = self.await_retrieval(dispense_time);
        self.finish(retrieval, pulse_ms, faults_before)
    }

    fn finish(&mut self, retrieval: RetrievalOutcome, pulse_ms: u64, faults_before: u32) -> FeedReport {
        self.motor.release();
        if pulse_ms > 0 {
            self.pulse(pulse_ms, 1);
        }
        self.flags.clear_pokes();

        let now = self.clock.now();
        let inter_pellet_s = self
            .last_pellet
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64());
        self.last_pellet = Some(now);

        let motor_turns = self.session.turns_attempted + 1;
        self.recorder.record_pellet(PelletFields {
            motor_turns,
            retrieval: retrieval.log_time(self.dispense.retrieval_window_ms),
            inter_pellet_s,
        });
        tracing::info!(motor_turns, ?retrieval, ?inter_pellet_s, "pellet delivered");

        self.session.turns_attempted = 0;
        self.session.pellet_available = true;
        self.flags.set_pellet_available(true);
        self.recorder.display().clear_transient_notice();
        self.recorder.refresh_display();
        self.transition(DispenseState::Done);

        FeedReport {
            motor_turns,
            jam_history: self.session.jam_history.clone(),
            retrieval,
            inter_pellet_s,
            motor_faults: self.motor.faults().saturating_sub(faults_before),
            counts: self.recorder.counts(),
        }
    }

    fn rotate_interleaved(&mut self, steps: i32) -> bool {
        let mut watch = PokeInterleave {
            sensors: &mut self.sensors,
            recorder: &mut self.recorder,
            count: self.pokes.count_all_pokes,
        };
        self.motor.rotate(steps, &mut watch)
    }

    fn run_jam(&mut self, tier: JamTier) -> bool {
        let mut rig = JamRig {
            sensors: &mut self.sensors,
            motor: &mut self.motor,
            recorder: &mut self.recorder,
            count: self.pokes.count_all_pokes,
            settle_ms: self.dispense.settle_check_ms,
        };
        self.jam.recover(tier, &mut rig)
    }

    /// Countdown window, then the stuck-pellet wait. Both capture pokes.
    fn await_retrieval(&mut self, dispense_time: Instant) -> RetrievalOutcome {
        let clock = Arc::clone(&self.clock);
        let poll = self.dispense.retrieval_poll();
        let window = Duration::from_millis(self.dispense.retrieval_window_ms);

        let first = poll_until(
            &*clock,
            || {
                if !self.sensors.is_pellet_present() {
                    return true;
                }
                let elapsed = clock.ms_since(dispense_time);
                self.recorder.display().render_retrieval_countdown(elapsed);
                self.capture_active_pokes(PokeContext::WithPellet);
                false
            },
            window,
            poll,
        );
        if first.is_satisfied() {
            return RetrievalOutcome::Retrieved {
                after_ms: clock.ms_since(dispense_time),
            };
        }

        let stuck_after = Duration::from_millis(self.dispense.stuck_timeout_ms);
        let remaining = stuck_after.saturating_sub(clock.now().saturating_duration_since(dispense_time));
        tracing::debug!(?remaining, "retrieval window closed; waiting for removal");
        let second = poll_until(
            &*clock,
            || {
                if !self.sensors.is_pellet_present() {
                    return true;
                }
                let left = stuck_after.saturating_sub(clock.now().saturating_duration_since(dispense_time));
                self.housekeeping_within(left);
                self.capture_active_pokes(PokeContext::WithPellet);
                false
            },
            remaining,
            poll,
        );
        if second.is_satisfied() {
            RetrievalOutcome::Retrieved {
                after_ms: clock.ms_since(dispense_time),
            }
        } else {
            tracing::warn!(after_ms = clock.ms_since(dispense_time), "pellet never taken");
            self.recorder.record_stuck();
            RetrievalOutcome::Stuck
        }
    }

    /// Capture and log every poke that is active right now.
    fn capture_active_pokes(&mut self, context: PokeContext) -> Vec<PokeEvent> {
        let mut captured = Vec::new();
        for side in Side::BOTH {
            if self.sensors.is_poke_active(side) {
                let poke = self.sensors.capture_poke(side, context);
                self.recorder.record_poke(&poke, self.pokes.count_all_pokes);
                captured.push(poke);
            }
        }
        captured
    }

    /// Log an ordinary poke on `side`. Ignored while a pellet is available.
    pub fn log_poke(&mut self, side: Side) -> Option<PokeEvent> {
        if self.flags.pellet_available() {
            return None;
        }
        let mut poke = self.sensors.capture_poke(side, PokeContext::Plain);
        if poke.duration_ms < self.pokes.min_poke_ms {
            poke.context = PokeContext::Short;
        }
        self.recorder.record_poke(&poke, true);
        self.flags.take_poke(side);
        Some(poke)
    }

    /// Log the pokes flagged by the interrupt handlers since the last call.
    pub fn service_pokes(&mut self) -> Vec<PokeEvent> {
        let mut logged = Vec::new();
        for side in Side::BOTH {
            if self.flags.take_poke(side) {
                logged.extend(self.log_poke(side));
            }
        }
        logged
    }

    /// Wait `seconds`, logging pokes as timeout pokes. With `reset_on_poke`
    /// each poke restarts the full wait.
    pub fn timeout(&mut self, seconds: u64, reset_on_poke: bool) -> Vec<PokeEvent> {
        let clock = Arc::clone(&self.clock);
        let span = Duration::from_secs(seconds);
        let poll = self.dispense.retrieval_poll();
        let mut pokes = Vec::new();
        loop {
            let restarted = poll_until(
                &*clock,
                || {
                    let captured = self.capture_active_pokes(PokeContext::DuringTimeout);
                    let poked = !captured.is_empty();
                    pokes.extend(captured);
                    reset_on_poke && poked
                },
                span,
                poll,
            );
            if !restarted.is_satisfied() {
                break;
            }
        }
        self.flags.clear_pokes();
        pokes
    }

    /// Periodic tick between feeds: re-check the well, refresh the display,
    /// and idle until an input changes or the wake interval passes.
    pub fn housekeeping(&mut self) {
        self.housekeeping_within(Duration::from_millis(self.sleep.wake_interval_ms));
    }

    fn housekeeping_within(&mut self, limit: Duration) {
        if !self.sensors.is_pellet_present() {
            self.session.pellet_available = false;
            self.flags.set_pellet_available(false);
        }
        self.recorder.refresh_display();
        if self.sleep.enabled {
            self.motor.release();
            self.idle(limit);
        }
    }

    fn idle(&mut self, limit: Duration) {
        let clock = Arc::clone(&self.clock);
        let poll = self.dispense.retrieval_poll();
        let well_before = self.sensors.inputs_mut().read(InputLine::PelletWell).is_active();
        poll_until(
            &*clock,
            || {
                let inputs = self.sensors.inputs_mut();
                inputs.read(InputLine::LeftPoke).is_active()
                    || inputs.read(InputLine::RightPoke).is_active()
                    || inputs.read(InputLine::PelletWell).is_active() != well_before
            },
            limit,
            poll,
        );
    }

    /// Free-running pulse train on the sync output.
    pub fn pulse_train(&mut self, width_ms: u64, freq_hz: u32, reps: u32) {
        if let Some(sync) = self.sync.as_deref_mut()
            && let Err(e) = crate::pulse::pulse_train(sync, &*self.clock, width_ms, freq_hz, reps)
        {
            tracing::warn!(error = %map_hw_error(&*e), "sync pulse train failed");
        }
    }

    fn pulse(&mut self, width_ms: u64, count: u32) {
        if let Some(sync) = self.sync.as_deref_mut()
            && let Err(e) = emit_sync_pulse(sync, &*self.clock, width_ms, count)
        {
            tracing::warn!(error = %map_hw_error(&*e), "sync pulse failed");
        }
    }

    fn lights_off(&mut self) {
        if let Some(ind) = self.indicators.as_deref_mut()
            && let Err(e) = ind.lights_off()
        {
            tracing::warn!(error = %map_hw_error(&*e), "indicator lights off failed");
        }
    }

    fn transition(&mut self, next: DispenseState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "dispense state");
            self.state = next;
        }
    }

    pub fn state(&self) -> DispenseState {
        self.state
    }

    pub fn session(&self) -> &DispenseSession {
        &self.session
    }

    pub fn counts(&self) -> Counters {
        self.recorder.counts()
    }

    pub fn pellet_available(&self) -> bool {
        self.flags.pellet_available()
    }

    pub fn flags(&self) -> &Arc<InterruptFlags> {
        &self.flags
    }

    pub fn last_pellet(&self) -> Option<Instant> {
        self.last_pellet
    }

    pub fn motor_faults(&self) -> u32 {
        self.motor.faults()
    }

    pub fn log_failures(&self) -> u32 {
        self.recorder.log_failures()
    }

    /// Power the motor driver down (best-effort).
    pub fn release_motor(&mut self) {
        self.motor.release();
    }

    /// Raw level of one input line, for diagnostics.
    pub fn read_input(&mut self, line: InputLine) -> PinState {
        self.sensors.inputs_mut().read(line)
    }
}
