#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Pellet dispense core (hardware-agnostic).
//!
//! All hardware goes through the `feeder_traits` seams: `Inputs` for the
//! pellet well and poke lines, `Motor` for the carousel stepper, plus the
//! optional `SyncOutput` and `Indicators`.
//!
//! ## Architecture
//!
//! - **Sensing**: debounced pellet detection and poke capture (`sensors`)
//! - **Motion**: micro-stepped rotation with a per-step observer (`motor`)
//! - **Jams**: the three-tier escalation and its maneuvers (`jam`)
//! - **Control**: the dispense state machine and retrieval wait (`controller`)
//! - **Logging**: event rows, CSV sink and counters (`event`, `logger`, `recorder`)
//! - **Interrupts**: flag-only edge handlers (`interrupts`)
//!
//! Everything time-dependent reads a `Clock`, so a `ManualClock` drives a
//! whole session deterministically in tests.

pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod display;
pub mod error;
pub mod event;
pub mod hw_error;
pub mod interrupts;
pub mod jam;
pub mod logger;
pub mod mocks;
pub mod motor;
pub mod poll;
pub mod pulse;
pub mod recorder;
pub mod sensors;

pub use builder::{Feeder, FeederBuilder, Missing, Set};
pub use config::{DispenseCfg, JamCfg, MotorCfg, PokeCfg, SensingCfg, SessionInfo, SleepCfg};
pub use controller::{
    DispenseController, DispenseSession, DispenseState, FeedReport, RetrievalOutcome,
};
pub use display::{Screen, StatusDisplay, TextDisplay, TracingDisplay};
pub use error::{BuildError, FeederError, Report, Result};
pub use event::{
    Counters, EventKind, EventRecord, PokeContext, PokeEvent, RetrievalTime, Side,
};
pub use interrupts::{InterruptFlags, InterruptGuard};
pub use jam::{Carousel, JamRecovery, JamTier};
pub use logger::{CsvEventLog, EventSink, Tee, TracingSink};
