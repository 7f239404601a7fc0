//! Integration test: probing moves.
//!
//! The probe handler stops the clock on the step that closed the probe
//! input; the background pass records the contact and resynchronizes the
//! planner so the next move starts from the contact point.

use evo_common::hal::StepClock;
use evo_common::motion::state::{AlarmCode, MachineStatus};
use evo_motion::error::MotionError;
use evo_motion::sim::{PositionSwitch, SimRunner};

use super::fixtures::{line, sim};

// ── Helpers ─────────────────────────────────────────────────────────

/// Probe plate `depth` steps below Z zero.
fn with_plate(depth: i32) -> SimRunner {
    let mut sim = sim("");
    sim.with_board(|b| b.set_probe_switch(Some(PositionSwitch::new(2, -depth, false))));
    sim
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn contact_stops_on_the_triggering_step() {
    let mut sim = with_plate(2000);
    sim.machine.queue_probe([0.0, 0.0, -10.0], 60.0).unwrap();
    sim.run_until_idle(15.0).unwrap();

    let result = sim.machine.probe_result().unwrap();
    assert!(result.success);
    assert_eq!(result.steps, [0, 0, -2000, 0]);
    assert!((result.position[2] + 5.0).abs() < 1e-4);
    assert_eq!(sim.board().position(), [0, 0, -2000, 0]);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.alarm(), None);
    assert!(sim.machine.planner().is_empty());
    assert!((sim.machine.planned_position()[2] + 5.0).abs() < 1e-4);

    // Retract from the contact point.
    line(&mut sim, [0.0, 0.0, 0.0], 300.0);
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [0; 4]);
}

#[test]
fn missing_contact_is_alarm() {
    let mut sim = with_plate(6000);
    sim.machine.queue_probe([0.0, 0.0, -10.0], 120.0).unwrap();
    sim.run_until(15.0, |m| m.status() == MachineStatus::Alarm)
        .unwrap();

    assert_eq!(sim.machine.alarm(), Some(AlarmCode::ProbeFailContact));
    let result = sim.machine.probe_result().unwrap();
    assert!(!result.success);
    assert_eq!(result.steps, [0, 0, -4000, 0]);
}

#[test]
fn probe_closed_before_move_is_refused() {
    let mut sim = sim("");
    sim.with_board(|b| b.set_probe_override(Some(true)));
    assert_eq!(
        sim.machine.queue_probe([0.0, 0.0, -10.0], 60.0),
        Err(MotionError::ProbeTriggered)
    );
    sim.run_for(0.05);
    assert_eq!(sim.machine.alarm(), Some(AlarmCode::ProbeFailInitial));
    assert!(!sim.board().is_running());
    assert_eq!(sim.board().position(), [0; 4]);
}

#[test]
fn probe_input_ignored_outside_probing() {
    let mut sim = with_plate(2000);
    line(&mut sim, [0.0, 0.0, -8.0], 300.0);
    sim.run_until_idle(10.0).unwrap();
    assert_eq!(sim.board().position(), [0, 0, -3200, 0]);
    assert_eq!(sim.machine.alarm(), None);
    assert_eq!(sim.machine.probe_result(), None);
}

#[test]
fn probe_refused_while_busy() {
    let mut sim = with_plate(2000);
    line(&mut sim, [5.0, 0.0, 0.0], 600.0);
    assert_eq!(
        sim.machine.queue_probe([0.0, 0.0, -10.0], 60.0),
        Err(MotionError::Busy)
    );
}
