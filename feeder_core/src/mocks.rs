//! Test doubles for feeder_core: scripted inputs, recording outputs and an
//! in-memory event sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use feeder_traits::{Direction, HwResult, Indicators, InputLine, Inputs, Motor, PinState, SyncOutput};

use crate::event::EventRecord;
use crate::logger::EventSink;

fn level(active: bool) -> PinState {
    if active {
        PinState::Active
    } else {
        PinState::Inactive
    }
}

/// Inputs that replay queued pellet-well levels, then hold a fixed level.
/// Poke lines are static.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInputs {
    well: VecDeque<bool>,
    well_rest: bool,
    left: bool,
    right: bool,
}

impl ScriptedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Levels returned by successive pellet-well reads.
    pub fn well_reads(mut self, reads: impl IntoIterator<Item = bool>) -> Self {
        self.well.extend(reads);
        self
    }

    /// Level once the queued reads are used up.
    pub fn well_rest(mut self, active: bool) -> Self {
        self.well_rest = active;
        self
    }

    pub fn left_held(mut self, held: bool) -> Self {
        self.left = held;
        self
    }

    pub fn right_held(mut self, held: bool) -> Self {
        self.right = held;
        self
    }
}

impl Inputs for ScriptedInputs {
    fn read(&mut self, line: InputLine) -> PinState {
        match line {
            InputLine::PelletWell => level(self.well.pop_front().unwrap_or(self.well_rest)),
            InputLine::LeftPoke => level(self.left),
            InputLine::RightPoke => level(self.right),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingMotor {
    position: i64,
    steps: u64,
    enabled: bool,
    fail: bool,
}

impl RecordingMotor {
    /// Every command errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Motor for RecordingMotor {
    fn set_enabled(&mut self, enabled: bool) -> HwResult<()> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("motor driver offline")));
        }
        self.enabled = enabled;
        Ok(())
    }

    fn step(&mut self, direction: Direction) -> HwResult<()> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("motor driver offline")));
        }
        self.steps += 1;
        self.position += match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        };
        Ok(())
    }
}

/// Sync output that records every level written.
#[derive(Debug, Default, Clone)]
pub struct RecordingSync {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingSync {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl SyncOutput for RecordingSync {
    fn set_level(&mut self, high: bool) -> HwResult<()> {
        if let Ok(mut l) = self.levels.lock() {
            l.push(high);
        }
        Ok(())
    }
}

/// Counts `lights_off` calls.
#[derive(Debug, Default, Clone)]
pub struct CountingIndicators {
    offs: Arc<Mutex<u32>>,
}

impl CountingIndicators {
    pub fn offs(&self) -> u32 {
        self.offs.lock().map(|n| *n).unwrap_or(0)
    }
}

impl Indicators for CountingIndicators {
    fn lights_off(&mut self) -> HwResult<()> {
        if let Ok(mut n) = self.offs.lock() {
            *n += 1;
        }
        Ok(())
    }
}

/// Event sink keeping records in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails (full SD card, unplugged drive).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Event names in log order.
    pub fn events(&self) -> Vec<String> {
        self.records().iter().map(|r| r.event.name()).collect()
    }
}

impl EventSink for MemorySink {
    fn append(&mut self, record: &EventRecord) -> HwResult<()> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("event log unavailable")));
        }
        if let Ok(mut r) = self.records.lock() {
            r.push(record.clone());
        }
        Ok(())
    }
}
