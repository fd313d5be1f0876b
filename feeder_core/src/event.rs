//! Typed behavioural events.
//!
//! Every row of the event log is an [`EventRecord`]; its `event` column comes
//! from [`EventKind::name`] and its poke-time column from
//! [`EventKind::poke_duration_ms`], so no code ever inspects the tag text.

use std::fmt;

/// Poke port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }

    pub fn line(self) -> feeder_traits::InputLine {
        match self {
            Side::Left => feeder_traits::InputLine::LeftPoke,
            Side::Right => feeder_traits::InputLine::RightPoke,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the device was doing when a poke happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokeContext {
    /// Ordinary poke with the well empty.
    Plain,
    /// Ordinary poke released before the minimum poke time.
    Short,
    /// Poke captured between micro-steps of a rotation.
    DuringDispense,
    /// Poke while a pellet sat in the well.
    WithPellet,
    /// Poke during a timeout period.
    DuringTimeout,
}

impl PokeContext {
    fn suffix(self) -> &'static str {
        match self {
            PokeContext::Plain => "",
            PokeContext::Short => "Short",
            PokeContext::DuringDispense => "DuringDispense",
            PokeContext::WithPellet => "WithPellet",
            PokeContext::DuringTimeout => "InTimeout",
        }
    }
}

/// One detected poke. `start_ms` is relative to the controller epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PokeEvent {
    pub side: Side,
    pub start_ms: u64,
    pub duration_ms: u64,
    pub context: PokeContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Pellet,
    PelletStuck,
    Poke {
        side: Side,
        context: PokeContext,
        duration_ms: u64,
    },
}

impl EventKind {
    pub fn name(&self) -> String {
        match self {
            EventKind::Pellet => "Pellet".to_string(),
            EventKind::PelletStuck => "PelletStuck".to_string(),
            EventKind::Poke { side, context, .. } => format!("{side}{}", context.suffix()),
        }
    }

    /// Duration for the poke-time column. Only poke events carry one.
    pub fn poke_duration_ms(&self) -> Option<u64> {
        match self {
            EventKind::Poke { duration_ms, .. } => Some(*duration_ms),
            EventKind::Pellet | EventKind::PelletStuck => None,
        }
    }
}

impl From<&PokeEvent> for EventKind {
    fn from(p: &PokeEvent) -> Self {
        EventKind::Poke {
            side: p.side,
            context: p.context,
            duration_ms: p.duration_ms,
        }
    }
}

/// Poke and pellet counters; they survive across feeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub left: u32,
    pub right: u32,
    pub pellets: u32,
}

impl Counters {
    pub fn bump(&mut self, side: Side) {
        match side {
            Side::Left => self.left = self.left.saturating_add(1),
            Side::Right => self.right = self.right.saturating_add(1),
        }
    }
}

/// Retrieval latency of a pellet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalTime {
    Millis(u64),
    /// Still in the well when the retrieval window closed.
    TimedOut,
}

/// A fully resolved event-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub elapsed_ms: u64,
    pub library_version: String,
    pub session_type: String,
    pub device_number: u32,
    /// Dispense attempts for this pellet; `Pellet` rows only.
    pub motor_turns: Option<u32>,
    pub fr: u32,
    pub event: EventKind,
    pub active_poke: Side,
    pub left_count: u32,
    pub right_count: u32,
    pub pellet_count: u32,
    pub retrieval: Option<RetrievalTime>,
    /// Seconds since the previous pellet; `None` for the first pellet and non-pellet rows.
    pub inter_pellet_s: Option<f64>,
}

impl EventRecord {
    pub fn poke_duration_ms(&self) -> Option<u64> {
        self.event.poke_duration_ms()
    }
}
