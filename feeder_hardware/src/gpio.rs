//! Raspberry Pi backend on `rppal`.
//!
//! All three input lines are active-low with the internal pull-ups enabled:
//! a beam break or nose touch pulls the line to ground.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use tracing::{debug, trace};

use feeder_traits::{Direction, HwResult, InputLine, Inputs, Motor, PinState, SyncOutput};

use crate::EdgeHandlers;
use crate::error::{HwError, Result};

/// Full-step drive sequence for a 4-coil unipolar stepper.
const FULL_STEP: [[bool; 4]; 4] = [
    [true, false, true, false],
    [false, true, true, false],
    [false, true, false, true],
    [true, false, false, true],
];

pub struct GpioInputs {
    pellet_well: InputPin,
    left_poke: InputPin,
    right_poke: InputPin,
}

impl GpioInputs {
    pub fn new(pellet_well: u8, left_poke: u8, right_poke: u8) -> Result<Self> {
        let gpio = Gpio::new()?;
        Ok(Self {
            pellet_well: gpio.get(pellet_well)?.into_input_pullup(),
            left_poke: gpio.get(left_poke)?.into_input_pullup(),
            right_poke: gpio.get(right_poke)?.into_input_pullup(),
        })
    }

    /// Register edge callbacks. Pellet removal is the well line going high,
    /// pokes are the poke lines going low.
    ///
    /// The callbacks live as long as the pins; rppal stops them when the
    /// pins drop. Dropping the interrupt guard earlier leaves them installed
    /// but inert, since they no longer find registered flags.
    pub fn attach_edge_handlers(&mut self, handlers: EdgeHandlers) -> Result<()> {
        if let Some(f) = handlers.pellet_removed {
            self.pellet_well
                .set_async_interrupt(Trigger::RisingEdge, move |_| f())
                .map_err(|e| HwError::Interrupt(e.to_string()))?;
        }
        if let Some(f) = handlers.left_poke {
            self.left_poke
                .set_async_interrupt(Trigger::FallingEdge, move |_| f())
                .map_err(|e| HwError::Interrupt(e.to_string()))?;
        }
        if let Some(f) = handlers.right_poke {
            self.right_poke
                .set_async_interrupt(Trigger::FallingEdge, move |_| f())
                .map_err(|e| HwError::Interrupt(e.to_string()))?;
        }
        debug!("edge interrupts attached");
        Ok(())
    }
}

impl Inputs for GpioInputs {
    fn read(&mut self, line: InputLine) -> PinState {
        let pin = match line {
            InputLine::PelletWell => &self.pellet_well,
            InputLine::LeftPoke => &self.left_poke,
            InputLine::RightPoke => &self.right_poke,
        };
        match pin.read() {
            Level::Low => PinState::Active,
            Level::High => PinState::Inactive,
        }
    }
}

/// 4-coil stepper behind a driver IC with an enable line.
pub struct GpioStepper {
    coils: [OutputPin; 4],
    enable: OutputPin,
    phase: usize,
}

impl GpioStepper {
    pub fn new(enable: u8, coils: [u8; 4]) -> Result<Self> {
        let gpio = Gpio::new()?;
        let mut enable = gpio.get(enable)?.into_output();
        enable.set_low();
        let [a, b, c, d] = coils;
        let mut coils = [
            gpio.get(a)?.into_output(),
            gpio.get(b)?.into_output(),
            gpio.get(c)?.into_output(),
            gpio.get(d)?.into_output(),
        ];
        for coil in &mut coils {
            coil.set_low();
        }
        Ok(Self {
            coils,
            enable,
            phase: 0,
        })
    }

    fn energize(&mut self) {
        let pattern = FULL_STEP[self.phase];
        for (coil, on) in self.coils.iter_mut().zip(pattern) {
            coil.write(if on { Level::High } else { Level::Low });
        }
    }
}

impl Motor for GpioStepper {
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        if enabled {
            self.enable.set_high();
        } else {
            for coil in &mut self.coils {
                coil.set_low();
            }
            self.enable.set_low();
        }
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> HwResult<()> {
        self.phase = match direction {
            Direction::Forward => (self.phase + 1) % FULL_STEP.len(),
            Direction::Reverse => (self.phase + FULL_STEP.len() - 1) % FULL_STEP.len(),
        };
        self.energize();
        trace!(phase = self.phase, "stepper phase");
        Ok(())
    }
}

/// BNC sync output.
pub struct GpioSync {
    pin: OutputPin,
}

impl GpioSync {
    pub fn new(pin: u8) -> Result<Self> {
        let mut pin = Gpio::new()?.get(pin)?.into_output();
        pin.set_low();
        Ok(Self { pin })
    }
}

impl SyncOutput for GpioSync {
    fn set_level(&mut self, high: bool) -> HwResult<()> {
        self.pin.write(if high { Level::High } else { Level::Low });
        Ok(())
    }
}
