#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;

pub use error::HwError;
pub use sim::{DropTiming, RigScript, RigStats, ScriptedPoke, SimRig};

/// Argument-less edge callbacks, one per input line.
///
/// Backends invoke these from their interrupt context (a GPIO event thread on
/// the Pi, the reading thread in the simulator). They must not block.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeHandlers {
    /// Fired when the pellet well goes from occupied to empty.
    pub pellet_removed: Option<fn()>,
    /// Fired when the left poke line becomes active.
    pub left_poke: Option<fn()>,
    /// Fired when the right poke line becomes active.
    pub right_poke: Option<fn()>,
}
