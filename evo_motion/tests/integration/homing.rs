//! Integration test: homing cycle on the simulated board.
//!
//! Validates the cycle end to end:
//! 1. Approach at the seek rate until the switch trips, then pull-off
//! 2. Passes in Z, X, Y order; machine position set to the travel end
//! 3. Failure alarms for a missing switch, the door and a reset
//! 4. Dual-drive squaring: each motor stops on its own switch

use evo_common::hal::{ControlInputs, StepClock, SwitchInputs};
use evo_common::motion::state::{AlarmCode, ExecState, MachineStatus};
use evo_motion::error::MotionError;
use evo_motion::machine::LineRequest;
use evo_motion::sim::{PositionSwitch, SimRunner};

use super::fixtures::{line, sim};

// ── Helpers ─────────────────────────────────────────────────────────

const HOMING: &str = "[homing]
enabled = true
seek_rate = 600.0
feed_rate = 60.0
pulloff = 2.0
";

/// Switches 50 mm below X, 30 mm below Y, 20 mm below Z.
fn with_switches(sim: &mut SimRunner) {
    sim.with_board(|b| {
        b.set_limit_switch(PositionSwitch::new(0, -4000, false));
        b.set_limit_switch(PositionSwitch::new(1, -2400, false));
        b.set_limit_switch(PositionSwitch::new(2, -8000, false));
    });
}

fn homing_sim() -> SimRunner {
    let mut sim = sim(HOMING);
    with_switches(&mut sim);
    sim
}

fn alarm_reached(sim: &mut SimRunner, seconds: f64) -> Option<AlarmCode> {
    sim.run_until(seconds, |m| m.status() == MachineStatus::Alarm)
        .unwrap();
    sim.machine.alarm()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn motion_refused_until_homed() {
    let mut sim = homing_sim();
    assert!(
        sim.machine
            .get_exec_state(ExecState::UNHOMED)
            .contains(ExecState::UNHOMED)
    );
    assert_eq!(
        sim.machine.queue_line(LineRequest::feed([1.0, 0.0, 0.0], 600.0)),
        Err(MotionError::Unhomed)
    );
    assert_eq!(
        sim.machine.queue_jog([1.0, 0.0, 0.0], 600.0),
        Err(MotionError::Unhomed)
    );
}

#[test]
fn full_cycle_sets_home_position() {
    let mut sim = homing_sim();
    sim.machine.home().unwrap();
    assert_eq!(sim.machine.status(), MachineStatus::Home);
    assert_eq!(sim.machine.home(), Err(MotionError::Busy));

    sim.run_until(30.0, |m| m.is_idle()).unwrap();

    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.alarm(), None);
    assert!(sim.machine.get_exec_state(ExecState::UNHOMED).is_empty());
    assert_eq!(sim.machine.interpolator().rt_position(), [0, 0, -32_000, 0]);
    let position = sim.machine.position();
    assert!((position[2] + 80.0).abs() < 1e-4);

    // Each axis stopped on its switch and backed off 2 mm.
    assert_eq!(sim.board().position(), [-3840, -2240, -7200, 0]);
    assert!(sim.board().limits().is_empty());

    // Homed: programmed moves are accepted again.
    line(&mut sim, [10.0, 10.0, -70.0], 1200.0);
    sim.run_until_idle(10.0).unwrap();
    assert_eq!(sim.machine.interpolator().rt_position(), [800, 800, -28_000, 0]);
}

#[test]
fn missing_switch_fails_approach() {
    let mut sim = sim(HOMING);
    sim.machine.home().unwrap();
    // Z searches 120 mm at 10 mm/s.
    assert_eq!(
        alarm_reached(&mut sim, 20.0),
        Some(AlarmCode::HomingFailApproach)
    );
    assert!(!sim.machine.get_exec_state(ExecState::UNHOMED).is_empty());
    assert!(sim.machine.get_exec_state(ExecState::HOMING).is_empty());

    sim.machine.reset().unwrap();
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(
        sim.machine.queue_line(LineRequest::feed([1.0, 0.0, 0.0], 600.0)),
        Err(MotionError::Unhomed)
    );
}

#[test]
fn door_aborts_homing() {
    let mut sim = homing_sim();
    sim.machine.home().unwrap();
    sim.run_for(0.5);

    sim.set_controls(ControlInputs::SAFETY_DOOR);
    assert_eq!(alarm_reached(&mut sim, 1.0), Some(AlarmCode::HomingFailDoor));
    let stopped = sim.board().position();
    sim.run_for(0.2);
    assert_eq!(sim.board().position(), stopped);
}

#[test]
fn reset_aborts_homing() {
    let mut sim = homing_sim();
    sim.machine.home().unwrap();
    sim.run_for(0.5);

    assert!(sim.inject(0x18));
    assert_eq!(alarm_reached(&mut sim, 1.0), Some(AlarmCode::HomingFailReset));
    assert!(!sim.board().is_running());

    sim.machine.reset().unwrap();
    assert!(!sim.machine.get_exec_state(ExecState::UNHOMED).is_empty());
}

#[test]
fn dual_drive_squares_the_gantry() {
    let mut sim = sim(&format!(
        "{HOMING}
[[steppers]]
name = \"Y2\"
steps_per_mm = 80.0
max_rate = 6000.0
acceleration = 500.0

[kinematics]
type = \"cartesian\"
dual_drive_axis = 1
"
    ));
    with_switches(&mut sim);
    // The second Y motor's switch sits 1 mm further out.
    sim.with_board(|b| b.set_limit_switch(PositionSwitch::new(3, -2480, false)));

    sim.machine.home().unwrap();
    sim.run_until(30.0, |m| m.is_idle()).unwrap();

    assert_eq!(sim.machine.alarm(), None);
    let board = sim.board().position();
    assert_eq!(board[1], -2240);
    assert_eq!(board[3], -2320);
    // Both motors now report the same machine position.
    assert_eq!(sim.machine.interpolator().rt_position(), [0, 0, -32_000, 0]);
}
