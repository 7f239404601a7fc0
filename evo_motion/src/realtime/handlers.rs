//! Input edge handlers.
//!
//! Called by the board glue whenever a limit, control or probe input
//! changes. Each handler reads the inputs it needs, does bounded work and
//! returns. They are the only place besides the step callbacks that may
//! stop the step clock without going through the background loop.

use evo_common::hal::{Board, ControlInputs};
use evo_common::motion::block::StepperMask;
use evo_common::motion::overrides::RtCommand;
use evo_common::motion::state::{AlarmCode, ExecState};

use super::ProbeState;
use crate::machine::Machine;

impl<B: Board> Machine<B> {
    /// Limit input change.
    ///
    /// During a homing approach, tripped switches of a dual-drive pair lock
    /// their motor until the whole target set has tripped, then the clock
    /// stops. Outside homing any tripped limit is a hard-limit halt.
    pub fn on_limits_changed(&mut self) {
        let limits = self.board.limits();

        if self.rt.exec.any(ExecState::HOMING) {
            let Some(target) = self.rt.homing_target else {
                return;
            };
            let hit = limits & target;
            if hit == target {
                self.itp.stop(&mut self.board);
                self.itp.set_locked(StepperMask::empty());
                self.rt.homing_target = None;
                self.rt.homing_reached = true;
            } else {
                self.itp.set_locked(self.kinematics.lock_axes(hit));
            }
            return;
        }

        if self.settings.limits.hard_limits && !limits.is_empty() {
            self.itp.stop(&mut self.board);
            self.rt
                .trip(ExecState::HALT | ExecState::LIMITS, AlarmCode::HardLimit);
        }
    }

    /// Control input change.
    pub fn on_controls_changed(&mut self) {
        let controls = self.board.controls();

        if controls.contains(ControlInputs::ESTOP) {
            self.itp.stop(&mut self.board);
            self.rt.trip(ExecState::KILL, AlarmCode::EmergencyStop);
            return;
        }

        if controls.contains(ControlInputs::SAFETY_DOOR) && !self.rt.exec.any(ExecState::DOOR) {
            if self.rt.exec.any(ExecState::HOMING) {
                self.itp.stop(&mut self.board);
                self.rt.trip(ExecState::HALT, AlarmCode::HomingFailDoor);
                return;
            }
            self.rt.exec.set(ExecState::DOOR);
            self.rt.events.latch(RtCommand::SafetyDoor);
        }
        if controls.contains(ControlInputs::FEED_HOLD) {
            self.rt.events.latch(RtCommand::FeedHold);
        }
        if controls.contains(ControlInputs::CYCLE_START) {
            self.rt.events.latch(RtCommand::CycleStart);
        }
    }

    /// Probe input change. Only an armed probing move reacts.
    pub fn on_probe_tripped(&mut self) {
        if self.rt.probe != ProbeState::Armed || !self.board.probe() {
            return;
        }
        let position = self.itp.rt_position();
        self.itp.stop(&mut self.board);
        self.rt.probe = ProbeState::Tripped(position);
    }
}
