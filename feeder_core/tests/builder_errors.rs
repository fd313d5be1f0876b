use feeder_core::error::BuildError;
use feeder_core::mocks::{RecordingMotor, ScriptedInputs};
use feeder_core::{DispenseCfg, DispenseState, Feeder, JamCfg, MotorCfg, PokeCfg};
use rstest::rstest;

#[rstest]
fn missing_inputs_yields_typed_build_error() {
    let err = Feeder::builder()
        .with_motor(RecordingMotor::default())
        .try_build()
        .expect_err("should fail with MissingInputs");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingInputs) => {}
        other => panic!("expected MissingInputs, got: {other:?}"),
    }
}

#[rstest]
fn missing_motor_yields_typed_build_error() {
    let err = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .try_build()
        .expect_err("should fail with MissingMotor");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingMotor) => {}
        other => panic!("expected MissingMotor, got: {other:?}"),
    }
}

#[rstest]
fn defaults_build_an_idle_feeder() {
    let feeder = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .with_seed(1)
        .build()
        .expect("defaults are valid");
    assert_eq!(feeder.state(), DispenseState::Idle);
    assert!(!feeder.pellet_available());
    assert_eq!(feeder.counts().pellets, 0);
}

#[rstest]
fn built_feeder_debug_shows_state_and_counts() {
    let feeder = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .build()
        .expect("defaults are valid");
    let shown = format!("{feeder:?}");
    assert!(shown.starts_with("DispenseController"), "{shown}");
    assert!(shown.contains("state: Idle"), "{shown}");
    assert!(shown.contains("pellets: 0"), "{shown}");
}

#[rstest]
#[case::zero_steps(
    DispenseCfg { dispense_steps: 0, ..DispenseCfg::default() },
    PokeCfg::default(),
    "dispense_steps"
)]
#[case::stuck_before_window(
    DispenseCfg { stuck_timeout_ms: 10, ..DispenseCfg::default() },
    PokeCfg::default(),
    "stuck_timeout_ms"
)]
#[case::zero_poll(
    DispenseCfg { retrieval_poll_us: 0, ..DispenseCfg::default() },
    PokeCfg::default(),
    "retrieval_poll_us"
)]
#[case::min_above_max(
    DispenseCfg::default(),
    PokeCfg { min_poke_ms: 500, max_poke_ms: 100, ..PokeCfg::default() },
    "min_poke_ms"
)]
fn invalid_runtime_config_is_rejected(
    #[case] dispense: DispenseCfg,
    #[case] pokes: PokeCfg,
    #[case] needle: &str,
) {
    let err = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .with_dispense(dispense)
        .with_pokes(pokes)
        .try_build()
        .expect_err("should reject");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
fn zero_motor_speed_is_rejected() {
    let err = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .with_motor_cfg(MotorCfg {
            rpm: 0,
            ..MotorCfg::default()
        })
        .try_build()
        .expect_err("should reject");
    assert!(format!("{err}").contains("motor speed"));
}

#[rstest]
fn non_positive_ramp_is_rejected() {
    let err = Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .with_jam(JamCfg {
            clear_ramp_steps: 0,
            ..JamCfg::default()
        })
        .try_build()
        .expect_err("should reject");
    assert!(format!("{err}").contains("clear_ramp_steps"));
}

#[rstest]
fn file_config_flows_into_the_builder() {
    let cfg = feeder_config::load_toml("[device]\nnumber = 9\n[pokes]\nmin_poke_ms = 10")
        .expect("parse TOML");
    cfg.validate().expect("valid");
    Feeder::builder()
        .with_inputs(ScriptedInputs::new())
        .with_motor(RecordingMotor::default())
        .with_config(&cfg)
        .build()
        .expect("file config is valid at runtime too");
}
