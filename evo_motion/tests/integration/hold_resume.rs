//! Integration test: feed hold, safety door and jog cancel.
//!
//! Validates the hold lifecycle:
//! 1. Hold request → controlled deceleration → parked, clock stopped
//! 2. Cycle start → resume from rest → every step of the program emitted
//! 3. Door: hold plus a lock that cycle start only releases once closed
//! 4. Jog cancel: hold, then the rest of the jog is dropped

use evo_common::hal::{ControlInputs, StepClock};
use evo_common::motion::state::{ExecState, MachineStatus};
use evo_motion::error::MotionError;
use evo_motion::machine::LineRequest;
use evo_motion::sim::SimRunner;

use super::fixtures::{line, sim};

// ── Helpers ─────────────────────────────────────────────────────────

fn park(sim: &mut SimRunner) {
    sim.run_until(1.0, |m| m.interpolator().hold_parked())
        .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn feed_hold_parks_and_resumes_without_losing_steps() {
    let mut sim = sim("");
    line(&mut sim, [40.0, 0.0, 0.0], 1200.0);
    sim.run_for(0.5);
    assert_eq!(sim.machine.status(), MachineStatus::Run);

    assert!(sim.inject(b'!'));
    park(&mut sim);
    assert_eq!(sim.machine.status(), MachineStatus::Hold);
    assert!(!sim.board().is_running());

    let parked = sim.board().position();
    assert!(parked[0] > 0 && parked[0] < 3200);
    sim.run_for(0.5);
    assert_eq!(sim.board().position(), parked);
    assert_eq!(sim.machine.status(), MachineStatus::Hold);

    assert!(sim.inject(b'~'));
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [3200, 0, 0, 0]);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.board().violations(), 0);
}

#[test]
fn hold_spans_queued_blocks() {
    let mut sim = sim("");
    for x in [5.0, 10.0, 15.0] {
        line(&mut sim, [x, 0.0, 0.0], 1200.0);
    }
    sim.run_for(0.2);
    sim.inject(b'!');
    park(&mut sim);
    assert!(!sim.machine.planner().is_empty());

    sim.inject(b'~');
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [1200, 0, 0, 0]);
}

#[test]
fn cycle_start_while_decelerating_is_ignored() {
    let mut sim = sim("");
    line(&mut sim, [40.0, 0.0, 0.0], 1200.0);
    sim.run_for(0.3);
    sim.inject(b'!');
    sim.inject(b'~');
    sim.run_for(0.3);
    assert_eq!(sim.machine.status(), MachineStatus::Hold);
}

#[test]
fn feed_hold_when_idle_is_ignored() {
    let mut sim = sim("");
    sim.inject(b'!');
    sim.run_for(0.05);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    line(&mut sim, [1.0, 0.0, 0.0], 600.0);
    sim.run_until_idle(2.0).unwrap();
    assert_eq!(sim.board().position(), [80, 0, 0, 0]);
}

#[test]
fn door_holds_until_closed() {
    let mut sim = sim("");
    line(&mut sim, [40.0, 0.0, 0.0], 1200.0);
    sim.run_for(0.3);

    sim.set_controls(ControlInputs::SAFETY_DOOR);
    park(&mut sim);
    assert_eq!(sim.machine.status(), MachineStatus::Door);
    let parked = sim.board().position();

    // New motion is refused while the door is open.
    assert!(matches!(
        sim.machine.queue_line(LineRequest::feed([0.0, 0.0, 0.0], 600.0)),
        Err(MotionError::Locked { alarm: None })
    ));

    sim.inject(b'~');
    sim.run_for(0.2);
    assert_eq!(sim.machine.status(), MachineStatus::Door);
    assert_eq!(sim.board().position(), parked);

    sim.set_controls(ControlInputs::empty());
    sim.inject(b'~');
    sim.run_until_idle(5.0).unwrap();
    assert!(sim.machine.get_exec_state(ExecState::DOOR).is_empty());
    assert_eq!(sim.board().position(), [3200, 0, 0, 0]);
}

#[test]
fn jog_cancel_drops_rest_of_jog() {
    let mut sim = sim("");
    sim.machine.queue_jog([50.0, 0.0, 0.0], 1200.0).unwrap();
    sim.run_for(0.3);
    assert_eq!(sim.machine.status(), MachineStatus::Jog);

    assert!(sim.inject(0x85));
    sim.run_until_idle(1.0).unwrap();
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    let stopped = sim.board().position();
    assert!(stopped[0] > 0 && stopped[0] < 4000);
    assert!(sim.machine.planner().is_empty());

    // Planning continues from where the jog stopped.
    let here = sim.machine.planned_position();
    assert!((here[0] - stopped[0] as f32 / 80.0).abs() < 1e-3);
    line(&mut sim, [0.0, 0.0, 0.0], 1200.0);
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [0; 4]);
}

#[test]
fn jog_refused_during_program() {
    let mut sim = sim("");
    line(&mut sim, [10.0, 0.0, 0.0], 600.0);
    assert_eq!(
        sim.machine.queue_jog([0.0, 5.0, 0.0], 600.0),
        Err(MotionError::Busy)
    );
}
