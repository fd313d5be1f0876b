//! Jam-recovery schedule and maneuvers.
//!
//! Most failed turns are just empty carousel pockets, so recovery escalates by
//! failed-turn count instead of running the full sweep every time.

use std::fmt;

use rand_core::RngCore;

use crate::config::JamCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JamTier {
    None,
    MinorJam,
    VibrateJam,
    ClearJam,
}

impl JamTier {
    /// Tier for the given count of failed turns. Multiples of 20 clear,
    /// other multiples of 10 vibrate, other multiples of 5 nudge.
    pub fn for_turn(turns_attempted: u32) -> Self {
        match turns_attempted {
            0 => JamTier::None,
            t if t % 20 == 0 => JamTier::ClearJam,
            t if t % 10 == 0 => JamTier::VibrateJam,
            t if t % 5 == 0 => JamTier::MinorJam,
            _ => JamTier::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JamTier::None => "none",
            JamTier::MinorJam => "minor",
            JamTier::VibrateJam => "vibrate",
            JamTier::ClearJam => "clear",
        }
    }
}

impl fmt::Display for JamTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a maneuver can do to the mechanism.
pub trait Carousel {
    /// Rotate with the usual per-step pellet watch; true if a pellet dropped.
    fn rotate(&mut self, steps: i32) -> bool;
    /// Short pellet-only wait; true if a pellet is (already) in the well.
    fn settle_check(&mut self) -> bool;
    fn show_jam_notice(&mut self);
    fn clear_jam_notice(&mut self);
}

pub struct JamRecovery<R> {
    cfg: JamCfg,
    rng: R,
}

impl<R: RngCore> JamRecovery<R> {
    pub fn new(cfg: JamCfg, rng: R) -> Self {
        Self { cfg, rng }
    }

    /// Run the maneuver for `tier`. True if it produced a pellet.
    pub fn recover(&mut self, tier: JamTier, carousel: &mut dyn Carousel) -> bool {
        let ok = match tier {
            JamTier::None => false,
            JamTier::MinorJam => self.minor_jam(carousel),
            JamTier::VibrateJam => self.vibrate_jam(carousel),
            JamTier::ClearJam => self.clear_jam(carousel),
        };
        tracing::debug!(%tier, dispensed = ok, "jam maneuver finished");
        ok
    }

    pub fn minor_jam(&mut self, carousel: &mut dyn Carousel) -> bool {
        carousel.rotate(self.cfg.minor_steps)
    }

    pub fn vibrate_jam(&mut self, carousel: &mut dyn Carousel) -> bool {
        carousel.show_jam_notice();
        if carousel.settle_check() {
            carousel.clear_jam_notice();
            return true;
        }
        for _ in 0..self.cfg.vibrate_cycles {
            if carousel.rotate(self.cfg.vibrate_forward_steps)
                || carousel.rotate(-self.cfg.vibrate_back_steps)
            {
                carousel.clear_jam_notice();
                return true;
            }
        }
        false
    }

    pub fn clear_jam(&mut self, carousel: &mut dyn Carousel) -> bool {
        carousel.show_jam_notice();
        if carousel.settle_check() {
            carousel.clear_jam_notice();
            return true;
        }
        let reverse = self.ramp_len();
        if self.sweep(carousel, reverse, -1) {
            carousel.clear_jam_notice();
            return true;
        }
        if carousel.settle_check() {
            carousel.clear_jam_notice();
            return true;
        }
        let forward = self.ramp_len();
        if self.sweep(carousel, forward, 1) {
            carousel.clear_jam_notice();
            return true;
        }
        false
    }

    /// Rotations of 0, r, 2r, ... steps (r = ramp increment) in direction `sign`.
    fn sweep(&self, carousel: &mut dyn Carousel, iterations: u32, sign: i32) -> bool {
        (0..iterations).any(|i| {
            let magnitude = i32::try_from(i)
                .unwrap_or(i32::MAX)
                .saturating_mul(self.cfg.clear_ramp_steps);
            carousel.rotate(sign * magnitude)
        })
    }

    /// `clear_base_iterations + rand(0..clear_jitter)`.
    ///
    /// Drawn once before each sweep, so a sweep's length is uniform over
    /// `base..base + jitter`. A bound re-rolled on every iteration would end
    /// sweeps earlier on average; this crate does not do that.
    fn ramp_len(&mut self) -> u32 {
        let jitter = if self.cfg.clear_jitter == 0 {
            0
        } else {
            self.rng.next_u32() % self.cfg.clear_jitter
        };
        self.cfg.clear_base_iterations + jitter
    }
}
