//! Turns dispense-path happenings into event records.
//!
//! Owns the counters, the event sink and the display, so every path that
//! logs (rotation, retrieval wait, timeouts) updates them the same way.

use std::sync::Arc;
use std::time::Instant;

use feeder_traits::Clock;

use crate::config::SessionInfo;
use crate::display::StatusDisplay;
use crate::event::{Counters, EventKind, EventRecord, PokeEvent, RetrievalTime};
use crate::hw_error::map_hw_error;
use crate::logger::EventSink;

/// Pellet-only columns of a `Pellet` row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PelletFields {
    pub motor_turns: u32,
    pub retrieval: RetrievalTime,
    pub inter_pellet_s: Option<f64>,
}

pub struct Recorder {
    sink: Box<dyn EventSink + Send>,
    display: Box<dyn StatusDisplay + Send>,
    session: SessionInfo,
    counts: Counters,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    log_failures: u32,
}

impl Recorder {
    pub fn new(
        sink: Box<dyn EventSink + Send>,
        display: Box<dyn StatusDisplay + Send>,
        session: SessionInfo,
        clock: Arc<dyn Clock + Send + Sync>,
        epoch: Instant,
    ) -> Self {
        Self {
            sink,
            display,
            session,
            counts: Counters::default(),
            clock,
            epoch,
            log_failures: 0,
        }
    }

    pub fn counts(&self) -> Counters {
        self.counts
    }

    pub fn log_failures(&self) -> u32 {
        self.log_failures
    }

    pub fn display(&mut self) -> &mut (dyn StatusDisplay + Send) {
        &mut *self.display
    }

    pub fn refresh_display(&mut self) {
        self.display.render_status(&self.counts);
    }

    /// Log a captured poke, bumping its side's counter first when `count`.
    pub fn record_poke(&mut self, poke: &PokeEvent, count: bool) {
        if count {
            self.counts.bump(poke.side);
        }
        tracing::debug!(
            side = %poke.side,
            start_ms = poke.start_ms,
            duration_ms = poke.duration_ms,
            counted = count,
            "poke"
        );
        self.refresh_display();
        self.emit(EventKind::from(poke), None);
    }

    /// Count and log a delivered pellet.
    pub fn record_pellet(&mut self, fields: PelletFields) {
        self.counts.pellets = self.counts.pellets.saturating_add(1);
        self.emit(EventKind::Pellet, Some(fields));
    }

    pub fn record_stuck(&mut self) {
        self.emit(EventKind::PelletStuck, None);
    }

    fn emit(&mut self, event: EventKind, pellet: Option<PelletFields>) {
        let record = EventRecord {
            elapsed_ms: self.clock.ms_since(self.epoch),
            library_version: self.session.library_version.clone(),
            session_type: self.session.session_type.clone(),
            device_number: self.session.device_number,
            motor_turns: pellet.map(|p| p.motor_turns),
            fr: self.session.fr,
            event,
            active_poke: self.session.active_poke,
            left_count: self.counts.left,
            right_count: self.counts.right,
            pellet_count: self.counts.pellets,
            retrieval: pellet.map(|p| p.retrieval),
            inter_pellet_s: pellet.and_then(|p| p.inter_pellet_s),
        };
        if let Err(e) = self.sink.append(&record) {
            self.log_failures = self.log_failures.saturating_add(1);
            tracing::error!(error = %map_hw_error(&*e), event = %event.name(), "event log write failed");
            self.display.show_log_failure();
        }
    }
}
