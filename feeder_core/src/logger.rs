//! Event-log sinks.
//!
//! The CSV log is the experiment's data product; `TracingSink` mirrors the
//! same rows into the diagnostic log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use eyre::WrapErr;
use feeder_traits::HwResult;

use crate::error::Result;
use crate::event::{EventRecord, RetrievalTime};

/// Append-only record sink. Failures are reported, never retried.
pub trait EventSink {
    fn append(&mut self, record: &EventRecord) -> HwResult<()>;
}

pub const CSV_HEADER: [&str; 14] = [
    "Elapsed_ms",
    "Library_Version",
    "Session_type",
    "Device_Number",
    "Motor_Turns",
    "FR",
    "Event",
    "Active_Poke",
    "Left_Poke_Count",
    "Right_Poke_Count",
    "Pellet_Count",
    "Retrieval_Time",
    "InterPelletInterval",
    "Poke_Time",
];

const NAN: &str = "nan";

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Columns of one row, in `CSV_HEADER` order.
pub fn csv_fields(r: &EventRecord) -> [String; 14] {
    [
        r.elapsed_ms.to_string(),
        r.library_version.clone(),
        r.session_type.clone(),
        r.device_number.to_string(),
        r.motor_turns.map_or_else(|| NAN.to_string(), |t| t.to_string()),
        r.fr.to_string(),
        r.event.name(),
        r.active_poke.to_string(),
        r.left_count.to_string(),
        r.right_count.to_string(),
        r.pellet_count.to_string(),
        match r.retrieval {
            Some(RetrievalTime::Millis(ms)) => seconds(ms),
            Some(RetrievalTime::TimedOut) => "Timed_out".to_string(),
            None => NAN.to_string(),
        },
        r.inter_pellet_s
            .map_or_else(|| NAN.to_string(), |s| format!("{s:.3}")),
        r.poke_duration_ms().map_or_else(|| NAN.to_string(), seconds),
    ]
}

/// CSV event log. Each row is flushed as soon as it is written.
pub struct CsvEventLog<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvEventLog<File> {
    /// Open `path` for appending; the header is written only to a new or empty file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("open event log {}", path.display()))?;
        let fresh = file
            .metadata()
            .wrap_err_with(|| format!("stat event log {}", path.display()))?
            .len()
            == 0;
        Self::with_writer(file, fresh)
    }
}

impl<W: Write> CsvEventLog<W> {
    /// Start a log on `writer`, writing the header row first.
    pub fn new(writer: W) -> Result<Self> {
        Self::with_writer(writer, true)
    }

    fn with_writer(writer: W, header: bool) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        if header {
            writer
                .write_record(CSV_HEADER)
                .wrap_err("write event log header")?;
            writer.flush().wrap_err("flush event log header")?;
        }
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| eyre::eyre!("flush event log: {}", e.error()))
    }
}

impl<W: Write> EventSink for CsvEventLog<W> {
    fn append(&mut self, record: &EventRecord) -> HwResult<()> {
        self.writer.write_record(csv_fields(record))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn append(&mut self, r: &EventRecord) -> HwResult<()> {
        tracing::info!(
            target: "feeder::events",
            event = %r.event.name(),
            elapsed_ms = r.elapsed_ms,
            left = r.left_count,
            right = r.right_count,
            pellets = r.pellet_count,
            motor_turns = ?r.motor_turns,
            retrieval = ?r.retrieval,
            inter_pellet_s = ?r.inter_pellet_s,
            poke_ms = ?r.poke_duration_ms(),
            "event"
        );
        Ok(())
    }
}

/// Fan a record out to several sinks. Every sink is tried; the first error wins.
pub struct Tee {
    sinks: Vec<Box<dyn EventSink + Send>>,
}

impl Tee {
    pub fn new(sinks: Vec<Box<dyn EventSink + Send>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for Tee {
    fn append(&mut self, record: &EventRecord) -> HwResult<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.append(record)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, PokeContext, Side};

    fn record(event: EventKind) -> EventRecord {
        EventRecord {
            elapsed_ms: 1234,
            library_version: "0.1.0".into(),
            session_type: "Free_feeding".into(),
            device_number: 3,
            motor_turns: None,
            fr: 1,
            event,
            active_poke: Side::Left,
            left_count: 2,
            right_count: 0,
            pellet_count: 1,
            retrieval: None,
            inter_pellet_s: None,
        }
    }

    #[test]
    fn header_then_rows() {
        let mut log = CsvEventLog::new(Vec::new()).unwrap();
        let mut pellet = record(EventKind::Pellet);
        pellet.motor_turns = Some(3);
        pellet.retrieval = Some(RetrievalTime::Millis(2500));
        log.append(&pellet).unwrap();
        log.append(&record(EventKind::Poke {
            side: Side::Left,
            context: PokeContext::WithPellet,
            duration_ms: 50,
        }))
        .unwrap();
        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(
            lines[1],
            "1234,0.1.0,Free_feeding,3,3,1,Pellet,Left,2,0,1,2.500,nan,nan"
        );
        assert_eq!(
            lines[2],
            "1234,0.1.0,Free_feeding,3,nan,1,LeftWithPellet,Left,2,0,1,nan,nan,0.050"
        );
    }

    #[test]
    fn timed_out_retrieval_is_spelled_out() {
        let mut r = record(EventKind::Pellet);
        r.retrieval = Some(RetrievalTime::TimedOut);
        r.inter_pellet_s = Some(61.5);
        let f = csv_fields(&r);
        assert_eq!(f[11], "Timed_out");
        assert_eq!(f[12], "61.500");
    }

    struct Broken;
    impl EventSink for Broken {
        fn append(&mut self, _: &EventRecord) -> HwResult<()> {
            Err("card removed".into())
        }
    }

    #[test]
    fn tee_tries_every_sink() {
        let mut tee = Tee::new(vec![Box::new(Broken), Box::new(TracingSink)]);
        let err = tee.append(&record(EventKind::PelletStuck)).unwrap_err();
        assert_eq!(err.to_string(), "card removed");
    }
}
