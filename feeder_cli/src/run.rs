//! Rig assembly, the feed and serve loops, and their printed output.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use feeder_config::Config;
use feeder_core::error::{FeederError, Result};
use feeder_core::interrupts::{self, InterruptFlags, InterruptGuard};
use feeder_core::{
    Counters, CsvEventLog, EventSink, FeedReport, Feeder, FeederBuilder, Missing,
    RetrievalOutcome, Tee, TracingSink,
};
use feeder_traits::{Clock, InputLine, MonotonicClock};
use serde_json::json;

use crate::cli::RigArgs;

/// Floor on one pass of the serve loop when sleep is disabled in the config.
const LOOP_TICK: Duration = Duration::from_millis(1);

/// An assembled feeder plus what keeps its interrupts routed.
pub struct Session {
    pub feeder: Feeder,
    pub clock: Arc<dyn Clock + Send + Sync>,
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    sim: feeder_hardware::SimRig,
    _interrupts: InterruptGuard,
}

fn event_sink(cfg: &Config, events: Option<&Path>) -> Result<Tee> {
    let mut sinks: Vec<Box<dyn EventSink + Send>> = vec![Box::new(TracingSink)];
    let path = events.or_else(|| cfg.logging.events_csv.as_deref().map(Path::new));
    if let Some(path) = path {
        let log = CsvEventLog::open(path).map_err(|e| FeederError::EventLog(format!("{e:#}")))?;
        tracing::info!(path = %path.display(), "event log opened");
        sinks.push(Box::new(log));
    }
    Ok(Tee::new(sinks))
}

pub fn open(cfg: &Config, rig: &RigArgs) -> Result<Session> {
    let flags = Arc::new(InterruptFlags::new());
    let builder = Feeder::builder()
        .with_config(cfg)
        .with_sink(event_sink(cfg, rig.events.as_deref())?)
        .with_flags(Arc::clone(&flags));
    open_rig(cfg, builder, flags, rig.realtime)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_rig(
    cfg: &Config,
    builder: FeederBuilder<Missing, Missing>,
    flags: Arc<InterruptFlags>,
    realtime: bool,
) -> Result<Session> {
    use feeder_hardware::{RigScript, SimRig};
    use feeder_traits::ManualClock;

    let clock: Arc<dyn Clock + Send + Sync> = if realtime {
        Arc::new(MonotonicClock::new())
    } else {
        Arc::new(ManualClock::new())
    };
    let script = RigScript::new()
        .empty_turns(cfg.sim.empty_turns)
        .drop_at_step(cfg.sim.drop_at_step)
        .turn_steps(cfg.dispense.dispense_steps.unsigned_abs())
        .retrieve_after(cfg.sim.retrieve_after_ms.map(Duration::from_millis));
    let sim = SimRig::new(script, Arc::clone(&clock));
    let feeder = builder
        .with_inputs(sim.inputs())
        .with_motor(sim.motor())
        .with_sync_output(sim.sync())
        .with_indicators(sim.indicators())
        .with_clock(Arc::clone(&clock))
        .with_seed(cfg.sim.seed)
        .build()?;

    let guard = interrupts::attach(flags);
    sim.attach_edge_handlers(interrupts::edge_handlers());
    tracing::info!(realtime, empty_turns = cfg.sim.empty_turns, "simulated rig ready");
    Ok(Session {
        feeder,
        clock,
        sim,
        _interrupts: guard,
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_rig(
    cfg: &Config,
    builder: FeederBuilder<Missing, Missing>,
    flags: Arc<InterruptFlags>,
    _realtime: bool,
) -> Result<Session> {
    use feeder_hardware::gpio::{GpioInputs, GpioStepper, GpioSync};

    fn hw_init(e: feeder_hardware::HwError) -> FeederError {
        FeederError::Hardware(format!("open feeder pins: {e}"))
    }

    let p = &cfg.pins;
    let mut inputs = GpioInputs::new(p.pellet_well, p.left_poke, p.right_poke).map_err(hw_init)?;
    let guard = interrupts::attach(flags);
    inputs
        .attach_edge_handlers(interrupts::edge_handlers())
        .map_err(hw_init)?;
    let motor = GpioStepper::new(p.motor_enable, p.motor_coils).map_err(hw_init)?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut builder = builder
        .with_inputs(inputs)
        .with_motor(motor)
        .with_clock(Arc::clone(&clock));
    if let Some(pin) = p.sync_out {
        builder = builder.with_sync_output(GpioSync::new(pin).map_err(hw_init)?);
    }
    let feeder = builder.build()?;
    tracing::info!(well = p.pellet_well, left = p.left_poke, right = p.right_poke, "GPIO rig ready");
    Ok(Session {
        feeder,
        clock,
        _interrupts: guard,
    })
}

impl Session {
    /// A stuck pellet blocks the next feed until someone takes it out.
    fn clear_stuck(&mut self, report: &FeedReport, shutdown: &AtomicBool) {
        if report.retrieval != RetrievalOutcome::Stuck {
            return;
        }
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        {
            tracing::info!("simulated rig: clearing stuck pellet");
            self.sim.remove_pellet();
        }
        tracing::warn!("pellet stuck in well; waiting for it to be removed");
        while self.feeder.read_input(InputLine::PelletWell).is_active()
            && !shutdown.load(Ordering::Relaxed)
        {
            self.feeder.housekeeping();
            self.clock.sleep(LOOP_TICK);
        }
    }
}

pub fn print_report(n: u32, r: &FeedReport, as_json: bool) {
    let retrieval_ms = match r.retrieval {
        RetrievalOutcome::Retrieved { after_ms } => Some(after_ms),
        RetrievalOutcome::Stuck => None,
    };
    if as_json {
        let jams: Vec<&str> = r.jam_history.iter().map(|t| t.as_str()).collect();
        let line = json!({
            "pellet": n,
            "motor_turns": r.motor_turns,
            "jam_history": jams,
            "retrieval_ms": retrieval_ms,
            "stuck": retrieval_ms.is_none(),
            "inter_pellet_s": r.inter_pellet_s,
            "motor_faults": r.motor_faults,
            "left": r.counts.left,
            "right": r.counts.right,
            "pellets": r.counts.pellets,
        });
        println!("{line}");
        return;
    }
    let retrieval = retrieval_ms.map_or_else(
        || "stuck".to_string(),
        |ms| format!("{:.3}s", ms as f64 / 1000.0),
    );
    let jams = if r.jam_history.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = r.jam_history.iter().map(|t| t.as_str()).collect();
        format!(" jams={}", names.join(","))
    };
    println!(
        "Pellet {n}: turns={}{jams} retrieval={retrieval} pokes L/R={}/{}",
        r.motor_turns, r.counts.left, r.counts.right
    );
}

/// Dispense `count` pellets, stopping early (between feeds) on shutdown.
pub fn feed(
    session: &mut Session,
    count: u32,
    pulse_ms: u64,
    shutdown: &AtomicBool,
    as_json: bool,
) -> Vec<FeedReport> {
    let mut reports = Vec::new();
    for n in 1..=count {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(delivered = reports.len(), "stopping on request");
            break;
        }
        let report = session.feeder.feed(pulse_ms, true);
        print_report(n, &report, as_json);
        session.clear_stuck(&report, shutdown);
        reports.push(report);
    }
    session.feeder.release_motor();
    reports
}

/// Free-feeding loop: service pokes, refill an empty well, idle.
pub fn serve(
    session: &mut Session,
    duration: Option<Duration>,
    pulse_ms: u64,
    shutdown: &AtomicBool,
    as_json: bool,
) -> Counters {
    let start = session.clock.now();
    let mut delivered = 0u32;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(delivered, "stopping on request");
            break;
        }
        if let Some(limit) = duration
            && session.clock.now().saturating_duration_since(start) >= limit
        {
            tracing::info!(delivered, "session duration reached");
            break;
        }
        for poke in session.feeder.service_pokes() {
            tracing::debug!(
                side = %poke.side,
                start_ms = poke.start_ms,
                duration_ms = poke.duration_ms,
                "poke serviced"
            );
        }
        if !session.feeder.pellet_available() {
            delivered += 1;
            let report = session.feeder.feed(pulse_ms, true);
            print_report(delivered, &report, as_json);
            session.clear_stuck(&report, shutdown);
        }
        session.feeder.housekeeping();
        session.clock.sleep(LOOP_TICK);
    }
    session.feeder.release_motor();
    session.feeder.counts()
}

pub fn print_totals(counts: &Counters, as_json: bool) {
    if as_json {
        println!(
            "{}",
            json!({ "pellets": counts.pellets, "left": counts.left, "right": counts.right })
        );
    } else {
        println!(
            "Session complete: pellets={} left={} right={}",
            counts.pellets, counts.left, counts.right
        );
    }
}
