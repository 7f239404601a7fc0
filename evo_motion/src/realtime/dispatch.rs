//! Background handling of latched real-time events.
//!
//! Runs at the top of every background pass. Reset is handled first and
//! alone; latched commands run in declaration order, then queued override
//! commands in arrival order.

use evo_common::hal::{Board, ControlInputs};
use evo_common::motion::block::{Coolant, StepperMask};
use evo_common::motion::overrides::{OverrideKind, Overrides, RtCommand};
use evo_common::motion::state::{AlarmCode, ExecState};
use tracing::{debug, info, warn};

use crate::error::ResetError;
use crate::machine::Machine;

impl<B: Board> Machine<B> {
    /// Act on every event latched or queued since the last pass.
    pub fn execute_realtime(&mut self) {
        let pending = self.rt.events.take();
        if pending.contains(RtCommand::Reset) {
            self.rt.events.clear_overrides();
            self.soft_reset();
            return;
        }

        for cmd in pending.iter() {
            match cmd {
                RtCommand::StatusReport => self.rt.request_status(),
                RtCommand::FeedHold => {
                    if self.rt.exec.any(ExecState::JOG) {
                        self.cancel_jog();
                    } else {
                        self.begin_hold();
                    }
                }
                RtCommand::CycleStart => self.cycle_start(),
                RtCommand::SafetyDoor => self.open_door(),
                RtCommand::JogCancel => self.cancel_jog(),
                _ => {}
            }
        }

        while let Some(cmd) = self.rt.events.next_override() {
            self.apply_override(cmd);
        }
        let dropped = self.rt.events.take_dropped();
        if dropped > 0 {
            warn!(dropped, "Override commands lost: queue full");
        }
    }

    // ─── Hold / Resume ──────────────────────────────────────────────

    /// Controlled deceleration to rest without losing position.
    fn begin_hold(&mut self) {
        if self.rt.exec.any(ExecState::HOLD | ExecState::HOMING) || !self.is_moving() {
            return;
        }
        self.rt.exec.set(ExecState::HOLD);
        self.rt.exec.clear(ExecState::RESUMING);
        self.rt.hold_parked = false;
        self.critical(|m| m.itp.request_hold());
    }

    fn open_door(&mut self) {
        if self.rt.exec.any(ExecState::HOMING) {
            self.critical(|m| m.itp.stop(&mut m.board));
            self.rt.trip(ExecState::HALT, AlarmCode::HomingFailDoor);
            return;
        }
        self.rt.exec.set(ExecState::DOOR);
        self.begin_hold();
        warn!("Safety door open");
    }

    /// Stop a jog with a hold and drop what is left of it once parked.
    fn cancel_jog(&mut self) {
        if !self.rt.exec.any(ExecState::JOG) {
            return;
        }
        self.rt.jog_cancel = true;
        self.begin_hold();
    }

    fn cycle_start(&mut self) {
        if self.rt.exec.any(ExecState::DOOR) {
            if self.board.controls().contains(ControlInputs::SAFETY_DOOR) {
                debug!("Cycle start ignored: door still open");
                return;
            }
            self.rt.exec.clear(ExecState::DOOR);
            info!("Safety door closed");
        }
        if !self.rt.exec.any(ExecState::HOLD) || self.rt.jog_cancel {
            return;
        }
        if !self.itp.hold_parked() {
            debug!("Cycle start ignored: still decelerating");
            return;
        }
        self.critical(|m| m.itp.resume(&mut m.planner));
        self.rt.exec.clear(ExecState::HOLD);
        self.rt.exec.set(ExecState::RESUMING);
        self.rt.hold_parked = false;
        info!(queued = self.planner.len(), "Cycle resumed");
    }

    /// Watch a hold until it parks; finish jog cancels.
    pub(crate) fn update_hold(&mut self) {
        if !self.rt.exec.any(ExecState::HOLD) || !self.itp.hold_parked() {
            return;
        }
        if self.rt.jog_cancel {
            self.discard_motion();
            self.rt.jog_cancel = false;
            self.rt.hold_parked = false;
            self.rt.exec.clear(ExecState::HOLD | ExecState::JOG);
            debug!(position = ?self.position(), "Jog cancelled");
            return;
        }
        if !self.rt.hold_parked {
            self.rt.hold_parked = true;
            info!(position = ?self.position(), "Hold parked");
        }
    }

    // ─── Overrides ──────────────────────────────────────────────────

    fn apply_override(&mut self, cmd: RtCommand) {
        let Some(kind) = self.overrides.apply(cmd, &self.settings.overrides) else {
            return;
        };
        match kind {
            OverrideKind::Feed => {
                let pct = self.overrides.feed;
                self.critical(|m| m.planner.apply_feed_override(pct));
            }
            OverrideKind::Rapid => {
                let pct = self.overrides.rapid;
                self.critical(|m| m.planner.apply_rapid_override(pct));
            }
            OverrideKind::Spindle => {
                let rpm = self.overrides.scale_spindle(self.itp.tool().spindle);
                self.board.set_spindle(rpm);
            }
            OverrideKind::Coolant => {
                let coolant = self.overrides.apply_coolant(self.itp.tool().coolant);
                self.board.set_coolant(coolant);
            }
        }
        debug!(
            ?kind,
            feed = self.overrides.feed,
            rapid = self.overrides.rapid,
            spindle = self.overrides.spindle,
            "Override changed"
        );
    }

    // ─── Reset ──────────────────────────────────────────────────────

    /// Reset command: abort motion first, clear state on the next reset.
    fn soft_reset(&mut self) {
        if self.rt.exec.any(ExecState::HOMING) {
            self.critical(|m| m.itp.stop(&mut m.board));
            self.rt.trip(ExecState::HALT, AlarmCode::HomingFailReset);
            return;
        }
        if self.itp.is_running() {
            self.critical(|m| m.itp.stop(&mut m.board));
            self.rt.trip(ExecState::HALT, AlarmCode::AbortCycle);
            return;
        }
        if let Err(e) = self.reset() {
            warn!(error = %e, "Reset refused");
        }
    }

    /// Leave halt/kill and return to idle.
    ///
    /// Refused while the emergency stop is still pressed or a hard limit is
    /// still closed. Queued motion is discarded and overrides return to 100 %.
    /// An alarm that lost the position leaves the machine unhomed.
    pub fn reset(&mut self) -> Result<(), ResetError> {
        let controls = self.board.controls();
        if controls.contains(ControlInputs::ESTOP) {
            return Err(ResetError::EstopActive);
        }
        if self.rt.exec.any(ExecState::LIMITS) && !self.board.limits().is_empty() {
            return Err(ResetError::LimitsActive);
        }

        self.discard_motion();
        self.itp.set_locked(StepperMask::empty());
        self.homing = None;
        self.overrides = Overrides::default();
        self.critical(|m| {
            m.planner.apply_feed_override(100);
            m.planner.apply_rapid_override(100);
        });
        self.board.set_spindle(0.0);
        self.board.set_coolant(Coolant::empty());
        self.itp.clear_tool();

        let alarm = self.rt.exec.alarm();
        let mut keep = self.rt.exec.get(ExecState::UNHOMED);
        if controls.contains(ControlInputs::SAFETY_DOOR) {
            keep |= ExecState::DOOR;
        }
        if self.settings.homing.enabled && alarm.is_some_and(|a| a.invalidates_position()) {
            keep |= ExecState::UNHOMED;
        }
        self.rt.exec.clear(!keep);
        self.rt.exec.clear_alarm();
        self.rt.clear_cycle();
        info!(status = self.status().label(), ?alarm, "Reset");
        Ok(())
    }
}
