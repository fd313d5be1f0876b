use feeder_config::{ActivePoke, load_toml};
use rstest::rstest;

#[test]
fn empty_file_yields_firmware_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should validate");
    assert_eq!(cfg.dispense.dispense_steps, -300);
    assert_eq!(cfg.dispense.inter_turn_delay_ms, 1500);
    assert_eq!(cfg.dispense.retrieval_window_ms, 60_000);
    assert_eq!(cfg.dispense.stuck_timeout_ms, 300_000);
    assert_eq!(cfg.pokes.max_poke_ms, 20_000);
    assert!(cfg.pokes.count_all_pokes);
    assert_eq!(cfg.jam.clear_base_iterations, 21);
    assert_eq!(cfg.sensing.post_step_polls, 20);
    assert_eq!(cfg.device.active_poke, ActivePoke::Left);
}

#[test]
fn accepts_partial_sections() {
    let toml = r#"
[device]
number = 7
session_type = "FR1"
active_poke = "right"

[pokes]
max_poke_ms = 5000
min_poke_ms = 50
count_all_pokes = false

[logging]
level = "debug"
rotation = "daily"
events_csv = "events.csv"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.device.number, 7);
    assert_eq!(cfg.device.active_poke, ActivePoke::Right);
    assert_eq!(cfg.pokes.min_poke_ms, 50);
    // untouched sections keep their defaults
    assert_eq!(cfg.jam.vibrate_cycles, 30);
}

#[rstest]
#[case("[dispense]\ndispense_steps = 0", "dispense_steps must be non-zero")]
#[case(
    "[dispense]\nretrieval_window_ms = 60000\nstuck_timeout_ms = 1000",
    "stuck_timeout_ms must be >= dispense.retrieval_window_ms"
)]
#[case("[pokes]\nmax_poke_ms = 0", "max_poke_ms must be >= 1")]
#[case("[pokes]\nmax_poke_ms = 100\nmin_poke_ms = 200", "min_poke_ms must be <=")]
#[case("[jam]\nclear_ramp_steps = 0", "clear_ramp_steps must be > 0")]
#[case("[motor]\nrpm = 0", "rpm must be in [1, 1000]")]
#[case("[sensing]\npellet_poll_us = 0", "pellet_poll_us must be >= 1")]
#[case("[sleep]\nenabled = true\nwake_interval_ms = 0", "wake_interval_ms must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"", "rotation must be one of")]
#[case("[pins]\nleft_poke = 17", "pins must be distinct")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn sleep_disabled_allows_zero_interval() {
    let cfg = load_toml("[sleep]\nenabled = false\nwake_interval_ms = 0").expect("parse TOML");
    cfg.validate().expect("disabled sleep ignores interval");
}

#[test]
fn rejects_unknown_active_poke() {
    assert!(load_toml("[device]\nactive_poke = \"center\"").is_err());
}
