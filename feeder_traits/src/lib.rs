pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Error type crossing the hardware trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The three digital input lines the dispense core watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputLine {
    PelletWell,
    LeftPoke,
    RightPoke,
}

/// Logical level of an input line. Implementations translate the electrical
/// polarity (the feeder's lines are active-low) into this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Active,
    Inactive,
}

impl PinState {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, PinState::Active)
    }
}

/// Carousel rotation direction. `Reverse` is the dispensing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Direction encoded by the sign of a step count (negative = reverse).
    #[inline]
    pub fn from_steps(steps: i32) -> Self {
        if steps < 0 {
            Direction::Reverse
        } else {
            Direction::Forward
        }
    }
}

/// Digital input lines. Reads never fail: an absent signal is a valid state.
pub trait Inputs {
    fn read(&mut self, line: InputLine) -> PinState;
}

/// Stepper motor driver.
pub trait Motor {
    /// Power the driver IC up or down. Disabling also de-energizes the coils.
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()>;
    /// Issue a single step in the given direction.
    fn step(&mut self, direction: Direction) -> HwResult<()>;
}

/// External synchronization output (BNC port).
pub trait SyncOutput {
    fn set_level(&mut self, high: bool) -> HwResult<()>;
}

/// Visual indicator lights around the poke ports.
pub trait Indicators {
    fn lights_off(&mut self) -> HwResult<()>;
}

impl<T: Inputs + ?Sized> Inputs for Box<T> {
    fn read(&mut self, line: InputLine) -> PinState {
        (**self).read(line)
    }
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        (**self).set_enabled(enabled)
    }
    fn step(&mut self, direction: Direction) -> HwResult<()> {
        (**self).step(direction)
    }
}
