use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use feeder_hardware::{DropTiming, EdgeHandlers, RigScript, SimRig};
use feeder_traits::{Clock, Direction, InputLine, Inputs, ManualClock, Motor, PinState, SyncOutput};
use rstest::rstest;

fn rig(script: RigScript) -> (SimRig, ManualClock) {
    let clock = ManualClock::new();
    (SimRig::new(script, Arc::new(clock.clone())), clock)
}

fn turn(motor: &mut impl Motor, steps: u32) {
    motor.set_enabled(true).unwrap();
    for _ in 0..steps {
        motor.step(Direction::Reverse).unwrap();
    }
    motor.set_enabled(false).unwrap();
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
fn pellet_drops_after_scripted_empty_turns(#[case] empty: u32) {
    let (rig, _clock) = rig(RigScript::new().empty_turns(empty).drop_at_step(120));
    let mut motor = rig.motor();
    for _ in 0..empty {
        turn(&mut motor, 300);
        assert!(!rig.snapshot().pellet_present);
    }
    turn(&mut motor, 300);
    let stats = rig.snapshot();
    assert!(stats.pellet_present);
    assert_eq!(stats.drops, 1);
    assert_eq!(stats.completed_turns, empty);
}

#[test]
fn drop_happens_exactly_at_scripted_step() {
    let (rig, _clock) = rig(RigScript::new().drop_at_step(7));
    let mut motor = rig.motor();
    let mut inputs = rig.inputs();
    motor.set_enabled(true).unwrap();
    for step in 1..=7 {
        assert_eq!(inputs.read(InputLine::PelletWell), PinState::Inactive, "step {step}");
        motor.step(Direction::Reverse).unwrap();
    }
    assert_eq!(inputs.read(InputLine::PelletWell), PinState::Active);
    assert_eq!(rig.snapshot().position, -7);
}

#[test]
fn short_reverse_rotations_are_not_turns() {
    let (rig, _clock) = rig(RigScript::new().empty_turns(1).drop_at_step(200));
    let mut motor = rig.motor();
    turn(&mut motor, 60);
    turn(&mut motor, 160);
    assert_eq!(rig.snapshot().completed_turns, 0);
}

#[test]
fn pellet_is_retrieved_after_delay_and_fires_handler() {
    static REMOVED: AtomicUsize = AtomicUsize::new(0);
    fn on_removed() {
        REMOVED.fetch_add(1, Ordering::SeqCst);
    }

    let (rig, clock) = rig(RigScript::new()
        .drop_at_step(1)
        .retrieve_after(Some(Duration::from_millis(500))));
    rig.attach_edge_handlers(EdgeHandlers {
        pellet_removed: Some(on_removed),
        ..EdgeHandlers::default()
    });
    let mut motor = rig.motor();
    let mut inputs = rig.inputs();
    turn(&mut motor, 1);
    assert!(inputs.read(InputLine::PelletWell).is_active());

    clock.sleep(Duration::from_millis(499));
    assert!(inputs.read(InputLine::PelletWell).is_active());
    clock.sleep(Duration::from_millis(1));
    assert!(!inputs.read(InputLine::PelletWell).is_active());
    assert_eq!(REMOVED.load(Ordering::SeqCst), 1);
    assert_eq!(rig.snapshot().retrieved, 1);
}

#[test]
fn scripted_poke_is_active_for_its_hold_window() {
    let (rig, clock) = rig(RigScript::new().poke(
        InputLine::LeftPoke,
        Duration::from_millis(10),
        Duration::from_millis(50),
    ));
    let mut inputs = rig.inputs();
    assert!(!inputs.read(InputLine::LeftPoke).is_active());
    clock.sleep(Duration::from_millis(10));
    assert!(inputs.read(InputLine::LeftPoke).is_active());
    assert!(!inputs.read(InputLine::RightPoke).is_active());
    clock.sleep(Duration::from_millis(49));
    assert!(inputs.read(InputLine::LeftPoke).is_active());
    clock.sleep(Duration::from_millis(1));
    assert!(!inputs.read(InputLine::LeftPoke).is_active());
}

#[test]
fn failing_driver_reports_errors() {
    let (rig, _clock) = rig(RigScript::new().fail_steps(true));
    let mut motor = rig.motor();
    assert!(motor.set_enabled(true).is_err());
    assert!(motor.step(Direction::Forward).is_err());
}

#[test]
fn sync_counts_rising_edges() {
    let (rig, _clock) = rig(RigScript::new());
    let mut sync = rig.sync();
    sync.set_level(true).unwrap();
    sync.set_level(true).unwrap();
    sync.set_level(false).unwrap();
    sync.set_level(true).unwrap();
    assert_eq!(rig.snapshot().sync_pulses, 2);
    assert!(rig.snapshot().sync_high);
}

#[test]
fn late_drop_lands_after_the_driver_stops() {
    let (rig, clock) = rig(RigScript::new()
        .empty_turns(1)
        .drop_timing(DropTiming::AfterTurn(Duration::from_millis(200))));
    let mut motor = rig.motor();
    let mut inputs = rig.inputs();

    turn(&mut motor, 300);
    assert_eq!(rig.snapshot().completed_turns, 1);
    // the due turn stays empty while the motor runs
    turn(&mut motor, 300);
    assert!(!inputs.read(InputLine::PelletWell).is_active());
    assert_eq!(rig.snapshot().completed_turns, 1);

    clock.sleep(Duration::from_millis(199));
    assert!(!inputs.read(InputLine::PelletWell).is_active());
    clock.sleep(Duration::from_millis(1));
    assert!(inputs.read(InputLine::PelletWell).is_active());
    assert_eq!(rig.snapshot().drops, 1);
}

#[test]
fn jammed_pellet_only_falls_on_a_forward_step() {
    let (rig, _clock) = rig(RigScript::new()
        .empty_turns(2)
        .drop_timing(DropTiming::OnForwardStep));
    let mut motor = rig.motor();
    let mut inputs = rig.inputs();

    // forward steps before the pellet is due do nothing
    motor.set_enabled(true).unwrap();
    motor.step(Direction::Forward).unwrap();
    motor.set_enabled(false).unwrap();
    for _ in 0..3 {
        turn(&mut motor, 300);
    }
    assert!(!inputs.read(InputLine::PelletWell).is_active());
    assert_eq!(rig.snapshot().completed_turns, 3);

    motor.set_enabled(true).unwrap();
    motor.step(Direction::Forward).unwrap();
    assert!(inputs.read(InputLine::PelletWell).is_active());
    motor.set_enabled(false).unwrap();
    assert_eq!(rig.snapshot().drops, 1);
}
