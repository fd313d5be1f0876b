//! Scripted feeder rig for tests, benches and the CLI's simulation mode.
//!
//! The rig models a carousel with empty pockets: after `empty_turns` completed
//! dispense turns, the next reverse rotation drops a pellet when it reaches
//! `drop_at_step` (see [`DropTiming`] for late and jam-freed drops). Pellets are taken after `retrieve_after`, and pokes follow a
//! fixed timeline relative to the rig's creation. All time comes from the
//! shared [`Clock`], so a `ManualClock` makes every run deterministic.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use feeder_traits::{Clock, Direction, HwResult, Indicators, InputLine, Inputs, Motor, PinState, SyncOutput};

use crate::EdgeHandlers;
use crate::error::HwError;

/// A poke on one line, active for `hold` starting `at` after the rig epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedPoke {
    pub line: InputLine,
    pub at: Duration,
    pub hold: Duration,
}

/// When the due pellet reaches the well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropTiming {
    /// At `drop_at_step` of the reverse rotation after the empty turns.
    #[default]
    DuringTurn,
    /// The due rotation completes empty; the pellet lands this long after the
    /// driver is disabled.
    AfterTurn(Duration),
    /// Only a forward step frees it, like a jam cleared by a nudge.
    OnForwardStep,
}

/// Behaviour of the simulated carousel.
#[derive(Debug, Clone)]
pub struct RigScript {
    empty_turns: u32,
    drop_at_step: u32,
    drop_timing: DropTiming,
    turn_steps: u32,
    retrieve_after: Option<Duration>,
    pellet_at_start: bool,
    pokes: Vec<ScriptedPoke>,
    fail_steps: bool,
}

impl Default for RigScript {
    fn default() -> Self {
        Self {
            empty_turns: 0,
            drop_at_step: 150,
            drop_timing: DropTiming::DuringTurn,
            turn_steps: 300,
            retrieve_after: Some(Duration::from_secs(2)),
            pellet_at_start: false,
            pokes: Vec::new(),
            fail_steps: false,
        }
    }
}

impl RigScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed dispense turns that come up empty before each drop.
    pub fn empty_turns(mut self, n: u32) -> Self {
        self.empty_turns = n;
        self
    }

    /// Micro-step (1-based) within the dropping rotation at which the pellet falls.
    pub fn drop_at_step(mut self, step: u32) -> Self {
        self.drop_at_step = step.max(1);
        self
    }

    pub fn drop_timing(mut self, timing: DropTiming) -> Self {
        self.drop_timing = timing;
        self
    }

    /// Minimum reverse steps a rotation needs to count as a dispense turn.
    pub fn turn_steps(mut self, steps: u32) -> Self {
        self.turn_steps = steps.max(1);
        self
    }

    /// Delay between a drop and the animal taking the pellet. `None` never takes it.
    pub fn retrieve_after(mut self, after: Option<Duration>) -> Self {
        self.retrieve_after = after;
        self
    }

    pub fn pellet_at_start(mut self, present: bool) -> Self {
        self.pellet_at_start = present;
        self
    }

    pub fn poke(mut self, line: InputLine, at: Duration, hold: Duration) -> Self {
        self.pokes.push(ScriptedPoke { line, at, hold });
        self
    }

    /// Make every motor call fail, to exercise best-effort motor handling.
    pub fn fail_steps(mut self, fail: bool) -> Self {
        self.fail_steps = fail;
        self
    }
}

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RigStats {
    /// Net carousel position in micro-steps (forward positive).
    pub position: i64,
    pub total_steps: u64,
    pub motor_enabled: bool,
    pub pellet_present: bool,
    pub drops: u32,
    pub retrieved: u32,
    pub completed_turns: u32,
    pub sync_pulses: u32,
    pub sync_high: bool,
    pub lights_off: u32,
}

#[derive(Debug)]
struct RigState {
    script: RigScript,
    pellet_present: bool,
    dropped_at: Option<Instant>,
    /// Scheduled landing of a `DropTiming::AfterTurn` pellet.
    pending_drop: Option<Instant>,
    enabled: bool,
    in_rotation: bool,
    rotation_dir: Option<Direction>,
    rotation_steps: u32,
    dropped_this_rotation: bool,
    turns_since_drop: u32,
    last_levels: [PinState; 3],
    handlers: EdgeHandlers,
    stats: RigStats,
}

impl RigState {
    fn poke_active(&self, line: InputLine, since_epoch: Duration) -> bool {
        self.script
            .pokes
            .iter()
            .any(|p| p.line == line && since_epoch >= p.at && since_epoch < p.at + p.hold)
    }

    fn level(&self, line: InputLine, since_epoch: Duration) -> PinState {
        let active = match line {
            InputLine::PelletWell => self.pellet_present,
            InputLine::LeftPoke | InputLine::RightPoke => self.poke_active(line, since_epoch),
        };
        if active { PinState::Active } else { PinState::Inactive }
    }

    /// Apply time-driven changes and collect edge callbacks to run once the
    /// lock is released.
    fn refresh(&mut self, now: Instant, since_epoch: Duration) -> Vec<fn()> {
        if let Some(at) = self.pending_drop.filter(|at| now >= *at) {
            self.pending_drop = None;
            self.drop_pellet(at);
            tracing::trace!("simulated late pellet drop");
        }
        let taken = match (self.dropped_at, self.script.retrieve_after) {
            (Some(dropped), Some(after)) => {
                self.pellet_present && now.saturating_duration_since(dropped) >= after
            }
            _ => false,
        };
        if taken {
            self.pellet_present = false;
            self.dropped_at = None;
            self.stats.retrieved += 1;
        }

        let mut fired = Vec::new();
        for (idx, line) in [InputLine::PelletWell, InputLine::LeftPoke, InputLine::RightPoke]
            .into_iter()
            .enumerate()
        {
            let level = self.level(line, since_epoch);
            let previous = self.last_levels[idx];
            self.last_levels[idx] = level;
            let handler = match (line, previous, level) {
                (InputLine::PelletWell, PinState::Active, PinState::Inactive) => {
                    self.handlers.pellet_removed
                }
                (InputLine::LeftPoke, PinState::Inactive, PinState::Active) => {
                    self.handlers.left_poke
                }
                (InputLine::RightPoke, PinState::Inactive, PinState::Active) => {
                    self.handlers.right_poke
                }
                _ => None,
            };
            fired.extend(handler);
        }
        fired
    }

    fn pellet_due(&self) -> bool {
        !self.pellet_present
            && self.pending_drop.is_none()
            && self.turns_since_drop >= self.script.empty_turns
    }

    fn drop_pellet(&mut self, at: Instant) {
        self.pellet_present = true;
        self.dropped_at = Some(at);
        self.turns_since_drop = 0;
        self.stats.drops += 1;
    }

    fn end_rotation(&mut self, now: Instant) {
        let empty_turn = self.in_rotation
            && self.rotation_dir == Some(Direction::Reverse)
            && self.rotation_steps >= self.script.turn_steps
            && !self.dropped_this_rotation;
        if empty_turn {
            match self.script.drop_timing {
                DropTiming::AfterTurn(delay) if self.pellet_due() => {
                    self.pending_drop = Some(now + delay);
                }
                _ => {
                    self.turns_since_drop += 1;
                    self.stats.completed_turns += 1;
                }
            }
        }
        self.in_rotation = false;
        self.rotation_dir = None;
        self.rotation_steps = 0;
        self.dropped_this_rotation = false;
    }
}

/// Shared handle to one simulated rig. Clones observe the same carousel.
#[derive(Clone)]
pub struct SimRig {
    state: Arc<Mutex<RigState>>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl std::fmt::Debug for SimRig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRig").field("stats", &self.snapshot()).finish()
    }
}

impl SimRig {
    pub fn new(script: RigScript, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let pellet_present = script.pellet_at_start;
        let well = if pellet_present { PinState::Active } else { PinState::Inactive };
        let state = RigState {
            script,
            pellet_present,
            dropped_at: pellet_present.then_some(epoch),
            pending_drop: None,
            enabled: false,
            in_rotation: false,
            rotation_dir: None,
            rotation_steps: 0,
            dropped_this_rotation: false,
            turns_since_drop: 0,
            last_levels: [well, PinState::Inactive, PinState::Inactive],
            handlers: EdgeHandlers::default(),
            stats: RigStats {
                pellet_present,
                ..RigStats::default()
            },
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
            epoch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn since_epoch(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.epoch)
    }

    /// Route input edges to the given callbacks, like GPIO interrupts.
    pub fn attach_edge_handlers(&self, handlers: EdgeHandlers) {
        self.lock().handlers = handlers;
    }

    pub fn detach_edge_handlers(&self) {
        self.lock().handlers = EdgeHandlers::default();
    }

    /// Take the pellet out of the well now.
    pub fn remove_pellet(&self) {
        let fired = {
            let mut st = self.lock();
            if st.pellet_present {
                st.pellet_present = false;
                st.dropped_at = None;
                st.stats.retrieved += 1;
            }
            let now = self.clock.now();
            st.refresh(now, self.since_epoch(now))
        };
        fired.into_iter().for_each(|f| f());
    }

    /// Put a pellet in the well by hand. It is retrieved per the script.
    pub fn place_pellet(&self) {
        let mut st = self.lock();
        st.pellet_present = true;
        st.dropped_at = Some(self.clock.now());
    }

    pub fn snapshot(&self) -> RigStats {
        let st = self.lock();
        RigStats {
            motor_enabled: st.enabled,
            pellet_present: st.pellet_present,
            ..st.stats
        }
    }

    pub fn inputs(&self) -> SimInputs {
        SimInputs { rig: self.clone() }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor { rig: self.clone() }
    }

    pub fn sync(&self) -> SimSync {
        SimSync { rig: self.clone() }
    }

    pub fn indicators(&self) -> SimIndicators {
        SimIndicators { rig: self.clone() }
    }
}

/// Input lines of a [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimInputs {
    rig: SimRig,
}

impl Inputs for SimInputs {
    fn read(&mut self, line: InputLine) -> PinState {
        let now = self.rig.clock.now();
        let since = self.rig.since_epoch(now);
        let (level, fired) = {
            let mut st = self.rig.lock();
            let fired = st.refresh(now, since);
            (st.level(line, since), fired)
        };
        fired.into_iter().for_each(|f| f());
        level
    }
}

/// Carousel stepper of a [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimMotor {
    rig: SimRig,
}

impl Motor for SimMotor {
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        let now = self.rig.clock.now();
        let mut st = self.rig.lock();
        if st.script.fail_steps {
            return Err(Box::new(HwError::Gpio("simulated driver fault".into())));
        }
        if enabled && !st.enabled {
            st.in_rotation = true;
            st.rotation_dir = None;
            st.rotation_steps = 0;
            st.dropped_this_rotation = false;
        } else if !enabled {
            st.end_rotation(now);
        }
        st.enabled = enabled;
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> HwResult<()> {
        let now = self.rig.clock.now();
        let mut st = self.rig.lock();
        if st.script.fail_steps {
            return Err(Box::new(HwError::Gpio("simulated step fault".into())));
        }
        if !st.enabled {
            tracing::trace!("step issued with driver disabled; ignored");
            return Ok(());
        }
        if st.rotation_dir != Some(direction) {
            // a direction change mid-rotation starts a new count
            st.rotation_dir = Some(direction);
            st.rotation_steps = 0;
        }
        st.rotation_steps += 1;
        st.stats.total_steps += 1;
        st.stats.position += match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        };
        let drops_here = match (st.script.drop_timing, direction) {
            (DropTiming::DuringTurn, Direction::Reverse) => {
                st.rotation_steps == st.script.drop_at_step
            }
            (DropTiming::OnForwardStep, Direction::Forward) => true,
            _ => false,
        };
        if drops_here && st.pellet_due() {
            st.drop_pellet(now);
            st.dropped_this_rotation = true;
            tracing::trace!(step = st.rotation_steps, ?direction, "simulated pellet drop");
        }
        Ok(())
    }
}

/// Sync (BNC) output of a [`SimRig`]; counts rising edges.
#[derive(Debug, Clone)]
pub struct SimSync {
    rig: SimRig,
}

impl SyncOutput for SimSync {
    fn set_level(&mut self, high: bool) -> HwResult<()> {
        let mut st = self.rig.lock();
        if high && !st.stats.sync_high {
            st.stats.sync_pulses += 1;
        }
        st.stats.sync_high = high;
        Ok(())
    }
}

/// Indicator lights of a [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimIndicators {
    rig: SimRig,
}

impl Indicators for SimIndicators {
    fn lights_off(&mut self) -> HwResult<()> {
        self.rig.lock().stats.lights_off += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeder_traits::ManualClock;

    fn rig(script: RigScript) -> (SimRig, ManualClock) {
        let clock = ManualClock::new();
        (SimRig::new(script, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn forward_rotation_never_drops() {
        let (rig, _clock) = rig(RigScript::new().drop_at_step(1));
        let mut motor = rig.motor();
        motor.set_enabled(true).unwrap();
        for _ in 0..10 {
            motor.step(Direction::Forward).unwrap();
        }
        motor.set_enabled(false).unwrap();
        let stats = rig.snapshot();
        assert_eq!(stats.position, 10);
        assert_eq!(stats.drops, 0);
        assert_eq!(stats.completed_turns, 0);
    }

    #[test]
    fn steps_while_disabled_are_ignored() {
        let (rig, _clock) = rig(RigScript::new());
        rig.motor().step(Direction::Reverse).unwrap();
        assert_eq!(rig.snapshot().total_steps, 0);
    }

    #[test]
    fn double_disable_counts_turn_once() {
        let (rig, _clock) = rig(RigScript::new().empty_turns(5).turn_steps(3));
        let mut motor = rig.motor();
        motor.set_enabled(true).unwrap();
        for _ in 0..3 {
            motor.step(Direction::Reverse).unwrap();
        }
        motor.set_enabled(false).unwrap();
        motor.set_enabled(false).unwrap();
        assert_eq!(rig.snapshot().completed_turns, 1);
    }
}
