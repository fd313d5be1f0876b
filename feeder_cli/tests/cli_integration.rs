use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Simulated rig with a short retrieval window so stuck pellets resolve fast
fn write_sim_config(dir: &tempfile::TempDir, retrieve_after_ms: u64) -> PathBuf {
    let toml = format!(
        r#"
[device]
number = 3
session_type = "Free_feeding"

[dispense]
retrieval_window_ms = 10000
stuck_timeout_ms = 20000

[sim]
seed = 42
empty_turns = 1
drop_at_step = 100
retrieve_after_ms = {retrieve_after_ms}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn feeder() -> Command {
    Command::cargo_bin("feeder").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["feed", "--count", "2"], 0, "Pellet 2:", "stdout")]
#[case(&["feed"], 0, "Session complete: pellets=1", "stdout")]
#[case(&["jam-schedule", "--from", "1", "--to", "20"], 0, "turn 20: clear", "stdout")]
#[case(&["feed", "--count", "x"], 2, "invalid value", "stderr")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, 2000);

    let mut cmd = feeder();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn runs_on_defaults_without_a_config_file() {
    feeder()
        .args(["feed", "--count", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pellet 1:"));
}

#[test]
fn json_feed_prints_one_object_per_pellet() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, 2000);

    let out = feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "feed", "--count", "2"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3, "two reports and the totals: {stdout}");
    assert_eq!(lines[0]["pellet"], 1);
    assert_eq!(lines[0]["motor_turns"], 2);
    assert_eq!(lines[0]["stuck"], false);
    let retrieval = lines[0]["retrieval_ms"].as_u64().unwrap();
    assert!((1000..=2000).contains(&retrieval), "retrieval {retrieval}");
    assert!(lines[0]["inter_pellet_s"].is_null());
    assert!(lines[1]["inter_pellet_s"].is_number());
    assert_eq!(lines[2]["pellets"], 2);
}

#[test]
fn events_csv_gets_header_and_pellet_rows() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, 2000);
    let events = dir.path().join("events.csv");

    feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["feed", "--count", "2", "--events"])
        .arg(&events)
        .assert()
        .success();

    let text = fs::read_to_string(&events).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("Elapsed_ms,Library_Version"));
    let pellets = text.lines().filter(|l| l.contains(",Pellet,")).count();
    assert_eq!(pellets, 2, "{text}");
}

#[test]
fn invalid_config_exits_with_two_and_explains() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[pokes]\nmax_poke_ms = 0\n").unwrap();

    feeder()
        .arg("--config")
        .arg(&cfg)
        .arg("feed")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("What happened"))
        .stderr(predicate::str::contains("max_poke_ms must be >= 1"));
}

#[test]
fn invalid_config_in_json_mode_is_structured() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[dispense]\ndispense_steps = \"many\"\n").unwrap();

    let out = feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "self-check"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 2);
}

#[test]
fn unwritable_event_log_exits_with_four() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, 2000);
    let events = dir.path().join("missing").join("events.csv");

    feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["feed", "--events"])
        .arg(&events)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("event log could not be opened"));
}

#[test]
fn serve_refills_until_the_duration_elapses() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, 2000);

    let out = feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "serve", "--duration-s", "60"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let totals: serde_json::Value =
        serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    assert!(totals["pellets"].as_u64().unwrap() >= 2, "{stdout}");
}

#[test]
fn stuck_pellet_is_reported_and_cleared() {
    let dir = tempdir().unwrap();
    // the simulated animal never shows up in time
    let cfg = write_sim_config(&dir, 600_000);

    feeder()
        .arg("--config")
        .arg(&cfg)
        .args(["feed", "--count", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pellet 1: turns=2 retrieval=stuck"))
        .stdout(predicate::str::contains("Pellet 2:"));
}

#[test]
fn jam_schedule_json_lists_each_tier() {
    let out = feeder()
        .args(["--json", "jam-schedule", "--from", "10", "--to", "10"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["turn"], 10);
    assert_eq!(v["tier"], "vibrate");
}
