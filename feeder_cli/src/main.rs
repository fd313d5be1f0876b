#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use feeder_config::Config;
use feeder_core::JamTier;
use feeder_core::error::{FeederError, Result};
use feeder_traits::InputLine;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RigArgs};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &cfg)?;

    match cli.cmd {
        Commands::Feed { count, rig } => cmd_feed(&cfg, count, &rig, cli.json),
        Commands::Serve { duration_s, rig } => {
            cmd_serve(&cfg, duration_s.map(Duration::from_secs), &rig, cli.json)
        }
        Commands::JamSchedule { from, to } => {
            jam_schedule(from, to, cli.json);
            Ok(())
        }
        Commands::SelfCheck => self_check(&cfg, cli.json),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| FeederError::Config(format!("read {}: {e}", path.display())))?;
    let cfg = feeder_config::load_toml(&text)
        .map_err(|e| FeederError::Config(format!("parse {}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| FeederError::Config(e.to_string()))?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &Config) -> Result<()> {
    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level {level}"))?,
    };

    // console goes to stderr so stdout stays machine-readable
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match cfg.logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| FeederError::Config(format!("logging.file {} has no file name", path.display())))?;
            let appender = match cfg.logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}

/// Ctrl-C sets the flag; the loops check it between feeds.
fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))
        .wrap_err("install Ctrl-C handler")?;
    Ok(flag)
}

fn cmd_feed(cfg: &Config, count: u32, rig: &RigArgs, as_json: bool) -> Result<()> {
    let shutdown = shutdown_flag()?;
    let mut session = run::open(cfg, rig)?;
    tracing::info!(count, "feed start");
    let reports = run::feed(&mut session, count, rig.pulse_ms, &shutdown, as_json);
    let counts = session.feeder.counts();
    run::print_totals(&counts, as_json);
    tracing::info!(delivered = reports.len(), "feed complete");
    Ok(())
}

fn cmd_serve(cfg: &Config, duration: Option<Duration>, rig: &RigArgs, as_json: bool) -> Result<()> {
    let shutdown = shutdown_flag()?;
    let mut session = run::open(cfg, rig)?;
    tracing::info!(?duration, "free feeding start");
    let counts = run::serve(&mut session, duration, rig.pulse_ms, &shutdown, as_json);
    run::print_totals(&counts, as_json);
    Ok(())
}

fn jam_schedule(from: u32, to: u32, as_json: bool) {
    for turn in from..=to {
        let tier = JamTier::for_turn(turn);
        if tier == JamTier::None {
            continue;
        }
        if as_json {
            println!("{}", serde_json::json!({ "turn": turn, "tier": tier.as_str() }));
        } else {
            println!("turn {turn}: {tier}");
        }
    }
}

fn self_check(cfg: &Config, as_json: bool) -> Result<()> {
    let rig = RigArgs {
        events: None,
        pulse_ms: 0,
        realtime: false,
    };
    let mut session = run::open(cfg, &rig)?;
    session.feeder.release_motor();
    let faults = session.feeder.motor_faults();
    if faults > 0 {
        return Err(FeederError::HardwareFault(format!("motor driver rejected {faults} command(s)")).into());
    }
    let lines = [
        ("pellet_well", InputLine::PelletWell),
        ("left_poke", InputLine::LeftPoke),
        ("right_poke", InputLine::RightPoke),
    ];
    let levels: Vec<(&str, bool)> = lines
        .iter()
        .map(|&(name, line)| (name, session.feeder.read_input(line).is_active()))
        .collect();

    if as_json {
        let inputs: serde_json::Map<String, serde_json::Value> = levels
            .iter()
            .map(|&(name, active)| (name.to_string(), serde_json::Value::Bool(active)))
            .collect();
        println!("{}", serde_json::json!({ "ok": true, "inputs": inputs }));
    } else {
        let shown: Vec<String> = levels
            .iter()
            .map(|&(name, active)| format!("{name}={}", if active { "active" } else { "inactive" }))
            .collect();
        println!("self-check ok: {}", shown.join(" "));
    }
    Ok(())
}
