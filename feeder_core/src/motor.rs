//! Carousel stepping with per-step sensor hooks.

use std::sync::Arc;
use std::time::Duration;

use feeder_traits::{Clock, Direction, Motor};

use crate::hw_error::map_hw_error;

/// Hooks run around every micro-step of a rotation.
pub trait StepObserver {
    /// Runs before the step is issued (poke capture).
    fn before_step(&mut self) {}
    /// Runs after the step; returning true ends the rotation as dispensed.
    fn after_step(&mut self) -> bool;
}

pub struct MotorDriver<M: Motor> {
    motor: M,
    clock: Arc<dyn Clock + Send + Sync>,
    step_interval: Duration,
    faults: u32,
}

impl<M: Motor> MotorDriver<M> {
    pub fn new(motor: M, clock: Arc<dyn Clock + Send + Sync>, step_interval: Duration) -> Self {
        Self {
            motor,
            clock,
            step_interval,
            faults: 0,
        }
    }

    /// Step `|steps|` times in the sign's direction, consulting `observer`
    /// around each step. Returns true as soon as the observer reports a pellet.
    ///
    /// The driver is always released before returning.
    pub fn rotate(&mut self, steps: i32, observer: &mut dyn StepObserver) -> bool {
        if steps == 0 {
            self.release();
            return false;
        }
        let direction = Direction::from_steps(steps);
        if let Err(e) = self.motor.set_enabled(true) {
            self.fault("enable", &*e);
        }

        let mut dispensed = false;
        let mut taken = 0u32;
        for _ in 0..steps.unsigned_abs() {
            observer.before_step();
            self.clock.sleep(self.step_interval);
            if let Err(e) = self.motor.step(direction) {
                self.fault("step", &*e);
            }
            taken += 1;
            if observer.after_step() {
                dispensed = true;
                break;
            }
        }

        self.release();
        tracing::trace!(steps, taken, dispensed, "rotation finished");
        dispensed
    }

    /// Power the driver down (best-effort).
    pub fn release(&mut self) {
        if let Err(e) = self.motor.set_enabled(false) {
            self.fault("disable", &*e);
        }
    }

    /// Hardware errors seen so far. Rotations never abort on them.
    pub fn faults(&self) -> u32 {
        self.faults
    }

    fn fault(&mut self, op: &'static str, e: &(dyn std::error::Error + 'static)) {
        self.faults = self.faults.saturating_add(1);
        tracing::warn!(error = %map_hw_error(e), op, "motor command failed");
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }
}
