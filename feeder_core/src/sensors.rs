//! Debounced reads of the pellet well and the two poke lines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use feeder_traits::{Clock, InputLine, Inputs};

use crate::config::SensingCfg;
use crate::event::{PokeContext, PokeEvent, Side};
use crate::poll::poll_until;

pub struct SensorPoller<I: Inputs> {
    inputs: I,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: SensingCfg,
    max_poke: Duration,
    epoch: Instant,
}

impl<I: Inputs> SensorPoller<I> {
    pub fn new(
        inputs: I,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: SensingCfg,
        max_poke_ms: u64,
        epoch: Instant,
    ) -> Self {
        Self {
            inputs,
            clock,
            cfg,
            max_poke: Duration::from_millis(max_poke_ms),
            epoch,
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.cfg.pellet_poll_us.max(1))
    }

    /// Two reads `debounce_us` apart; both must see the well occupied.
    pub fn is_pellet_present(&mut self) -> bool {
        if !self.inputs.read(InputLine::PelletWell).is_active() {
            return false;
        }
        self.clock.sleep(Duration::from_micros(self.cfg.debounce_us));
        self.inputs.read(InputLine::PelletWell).is_active()
    }

    /// Raw, undebounced poke level.
    pub fn is_poke_active(&mut self, side: Side) -> bool {
        self.inputs.read(side.line()).is_active()
    }

    /// Wait for the poke on `side` to release, up to the poke ceiling.
    /// Returns the hold time in ms, clamped to the ceiling.
    pub fn hold_poke(&mut self, side: Side) -> u64 {
        let interval = self.poll_interval();
        let clock = &*self.clock;
        let inputs = &mut self.inputs;
        let start = clock.now();
        poll_until(
            clock,
            || !inputs.read(side.line()).is_active(),
            self.max_poke,
            interval,
        );
        let held = clock.now().saturating_duration_since(start).min(self.max_poke);
        u64::try_from(held.as_millis()).unwrap_or(u64::MAX)
    }

    /// Time a poke that is active now.
    pub fn capture_poke(&mut self, side: Side, context: PokeContext) -> PokeEvent {
        let start_ms = self.clock.ms_since(self.epoch);
        let duration_ms = self.hold_poke(side);
        tracing::trace!(side = %side, duration_ms, "poke captured");
        PokeEvent {
            side,
            start_ms,
            duration_ms,
            context,
        }
    }

    /// Pellet-only wait: true as soon as the well is (debounced) occupied,
    /// false once `window_ms` passes without a pellet.
    pub fn wait_for_pellet(&mut self, window_ms: u64) -> bool {
        let interval = self.poll_interval();
        self.poll_pellet(Duration::from_millis(window_ms), interval)
    }

    /// Fine-grained watch after a micro-step: `post_step_polls` pellet checks
    /// one poll interval apart (at least one check).
    pub fn watch_after_step(&mut self) -> bool {
        let interval = self.poll_interval();
        let span = interval * self.cfg.post_step_polls.saturating_sub(1);
        self.poll_pellet(span, interval)
    }

    fn poll_pellet(&mut self, timeout: Duration, interval: Duration) -> bool {
        let clock = Arc::clone(&self.clock);
        poll_until(&*clock, || self.is_pellet_present(), timeout, interval).is_satisfied()
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn inputs_mut(&mut self) -> &mut I {
        &mut self.inputs
    }
}
