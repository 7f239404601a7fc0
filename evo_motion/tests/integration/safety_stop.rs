//! Integration test: emergency stop, hard limits and reset.
//!
//! Validates the stop and recovery lifecycle:
//! 1. Kill or limit input → clock stopped in the handler, no further pulse
//! 2. Alarm latched; motion refused while locked
//! 3. Reset refused while the source is present, then back to idle

use evo_common::hal::{ControlInputs, StepClock};
use evo_common::motion::block::{Coolant, ToolState};
use evo_common::motion::state::{AlarmCode, ExecState, MachineStatus};
use evo_motion::error::{MotionError, ResetError};
use evo_motion::machine::LineRequest;
use evo_motion::sim::PositionSwitch;

use super::fixtures::{line, sim};

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn estop_kills_motion_and_blocks_reset() {
    let mut sim = sim("");
    sim.machine
        .queue_line(
            LineRequest::feed([40.0, 0.0, 0.0], 1200.0).with_tool(ToolState {
                spindle: 12_000.0,
                coolant: Coolant::FLOOD,
            }),
        )
        .unwrap();
    sim.run_for(0.3);
    assert_eq!(sim.board().spindle(), 12_000.0);

    sim.set_controls(ControlInputs::ESTOP);
    assert!(!sim.board().is_running());
    let stopped = sim.board().position();

    sim.run_for(0.2);
    assert_eq!(sim.board().position(), stopped);
    assert_eq!(sim.machine.status(), MachineStatus::Alarm);
    assert_eq!(sim.machine.alarm(), Some(AlarmCode::EmergencyStop));
    assert_eq!(sim.board().spindle(), 0.0);
    assert_eq!(sim.board().coolant(), Coolant::empty());
    assert!(sim.machine.planner().is_empty());

    assert_eq!(
        sim.machine.queue_line(LineRequest::feed([0.0, 0.0, 0.0], 600.0)),
        Err(MotionError::Locked {
            alarm: Some(AlarmCode::EmergencyStop)
        })
    );
    assert_eq!(sim.machine.reset(), Err(ResetError::EstopActive));

    sim.set_controls(ControlInputs::empty());
    sim.machine.reset().unwrap();
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.alarm(), None);

    line(&mut sim, [0.0, 0.0, 0.0], 1200.0);
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [0; 4]);
}

#[test]
fn hard_limit_stops_on_the_switch() {
    let mut sim = sim("");
    sim.with_board(|b| b.set_limit_switch(PositionSwitch::new(0, 800, true)));
    line(&mut sim, [20.0, 0.0, 0.0], 600.0);

    sim.run_until(5.0, |m| m.status() == MachineStatus::Alarm)
        .unwrap();
    assert_eq!(sim.board().position()[0], 800);
    assert_eq!(sim.machine.alarm(), Some(AlarmCode::HardLimit));
    assert!(sim.machine.get_exec_state(ExecState::LIMITS).contains(ExecState::LIMITS));

    sim.run_for(0.1);
    assert_eq!(sim.board().position()[0], 800);
    assert_eq!(sim.machine.reset(), Err(ResetError::LimitsActive));

    // Switch released (the axis was moved off by hand).
    sim.with_board(|b| b.set_limit_switch(PositionSwitch::new(0, 2000, true)));
    sim.machine.reset().unwrap();
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.interpolator().rt_position()[0], 800);
}

#[test]
fn hard_limits_can_be_disabled() {
    let mut sim = sim("[limits]\nhard_limits = false\n");
    sim.with_board(|b| b.set_limit_switch(PositionSwitch::new(0, 800, true)));
    line(&mut sim, [20.0, 0.0, 0.0], 1200.0);
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position()[0], 1600);
    assert_eq!(sim.machine.alarm(), None);
}

#[test]
fn reset_while_moving_aborts_then_clears() {
    let mut sim = sim("");
    line(&mut sim, [40.0, 0.0, 0.0], 1200.0);
    sim.run_for(0.2);

    assert!(sim.inject(0x18));
    sim.run_for(0.05);
    assert_eq!(sim.machine.status(), MachineStatus::Alarm);
    assert_eq!(sim.machine.alarm(), Some(AlarmCode::AbortCycle));
    assert!(!sim.board().is_running());
    let stopped = sim.board().position();
    assert_eq!(sim.machine.interpolator().rt_position(), stopped);

    assert!(sim.inject(0x18));
    sim.run_for(0.05);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.alarm(), None);
    assert_eq!(sim.machine.overrides().feed, 100);
}

#[test]
fn soft_limit_rejects_without_alarm() {
    let mut sim = sim("[limits]\nsoft_limits = true\n");
    assert!(matches!(
        sim.machine
            .queue_line(LineRequest::feed([250.0, 0.0, 0.0], 600.0)),
        Err(MotionError::SoftLimit { .. })
    ));
    assert!(matches!(
        sim.machine
            .queue_line(LineRequest::feed([10.0, 0.0, 5.0], 600.0)),
        Err(MotionError::SoftLimit { .. })
    ));
    sim.run_for(0.05);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    assert_eq!(sim.machine.alarm(), None);
    line(&mut sim, [10.0, 0.0, 0.0], 600.0);
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [800, 0, 0, 0]);
}
