//! Simulated board and a discrete-event runner.
//!
//! [`SimBoard`] implements every board trait in memory: it counts pulses,
//! tracks the net step position, derives limit and probe inputs from that
//! position and records tool outputs. [`SimRunner`] plays the role of the
//! interrupt controller: it fires the step callbacks at the period the
//! interpolator programs, calls the edge handlers when an input changes and
//! runs the background loop at a fixed interval.
//!
//! Time is counted in step-clock source cycles, so a run is deterministic
//! and independent of the host.

use evo_common::consts::STEPPER_COUNT;
use evo_common::hal::{ControlInputs, StepClock, StepperOutputs, SwitchInputs, ToolDriver};
use evo_common::motion::block::{Coolant, StepperMask};
use thiserror::Error;
use tracing::trace;

use crate::config::Settings;
use crate::error::KinematicsError;
use crate::kinematics::Kinematics;
use crate::machine::Machine;

/// Background pass interval [s].
pub const BACKGROUND_PERIOD: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SimError {
    #[error("condition not met within {seconds:.3} s of simulated time")]
    Timeout { seconds: f64 },
}

// ─── Switches ───────────────────────────────────────────────────────

/// A switch closed whenever a stepper is at or beyond `trip_at`.
///
/// Defined in stepper space: `positive` switches close at
/// `position >= trip_at`, the others at `position <= trip_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSwitch {
    pub stepper: usize,
    pub trip_at: i32,
    pub positive: bool,
}

impl PositionSwitch {
    pub const fn new(stepper: usize, trip_at: i32, positive: bool) -> Self {
        Self {
            stepper,
            trip_at,
            positive,
        }
    }

    fn closed(&self, position: &[i32; STEPPER_COUNT]) -> bool {
        let p = position[self.stepper];
        if self.positive {
            p >= self.trip_at
        } else {
            p <= self.trip_at
        }
    }
}

// ─── Sim Board ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimBoard {
    clock_hz: u32,
    running: bool,
    /// Current step period [source cycles].
    period: u64,
    min_period: u64,
    mask_depth: u8,
    stepping: bool,
    violations: u32,
    directions: StepperMask,
    enabled: bool,
    pulses: [u64; STEPPER_COUNT],
    position: [i32; STEPPER_COUNT],
    limit_switches: [Option<PositionSwitch>; STEPPER_COUNT],
    probe_switch: Option<PositionSwitch>,
    probe_override: Option<bool>,
    controls: ControlInputs,
    spindle: f32,
    coolant: Coolant,
}

impl SimBoard {
    pub fn new(settings: &Settings) -> Self {
        Self {
            clock_hz: settings.interpolator.step_clock_hz,
            running: false,
            period: u64::MAX,
            min_period: u64::MAX,
            mask_depth: 0,
            stepping: false,
            violations: 0,
            directions: StepperMask::empty(),
            enabled: false,
            pulses: [0; STEPPER_COUNT],
            position: [0; STEPPER_COUNT],
            limit_switches: [None; STEPPER_COUNT],
            probe_switch: None,
            probe_override: None,
            controls: ControlInputs::empty(),
            spindle: 0.0,
            coolant: Coolant::empty(),
        }
    }

    /// Install the limit switch of `switch.stepper`.
    pub fn set_limit_switch(&mut self, switch: PositionSwitch) {
        self.limit_switches[switch.stepper] = Some(switch);
    }

    pub fn with_limit_switch(mut self, switch: PositionSwitch) -> Self {
        self.set_limit_switch(switch);
        self
    }

    /// Place a limit switch at the home position of every stepper the
    /// homing sequence drives, on the side it approaches from.
    pub fn install_home_switches(
        &mut self,
        kinematics: &dyn Kinematics,
    ) -> Result<(), KinematicsError> {
        let home = kinematics.inverse(&kinematics.home_position())?;
        for step in kinematics.home_sequence() {
            for (i, &direction) in step.direction.iter().enumerate() {
                if step.limit_mask.has(i) && direction != 0 {
                    self.set_limit_switch(PositionSwitch::new(i, home[i], direction > 0));
                }
            }
        }
        Ok(())
    }

    pub fn set_probe_switch(&mut self, switch: Option<PositionSwitch>) {
        self.probe_switch = switch;
    }

    /// Force the probe input regardless of position (`None` to release).
    pub fn set_probe_override(&mut self, state: Option<bool>) {
        self.probe_override = state;
    }

    pub fn set_controls(&mut self, controls: ControlInputs) {
        self.controls = controls;
    }

    // ─── Observations ───────────────────────────────────────────────

    /// Pulses emitted per stepper, regardless of direction.
    pub fn pulses(&self) -> [u64; STEPPER_COUNT] {
        self.pulses
    }

    /// Net position from pulses and direction lines.
    pub fn position(&self) -> [i32; STEPPER_COUNT] {
        self.position
    }

    /// Step assert without a reset in between, or a callback while masked.
    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn mask_depth(&self) -> u8 {
        self.mask_depth
    }

    pub fn period_cycles(&self) -> u64 {
        self.period
    }

    /// Highest step-clock rate programmed so far [Hz].
    pub fn peak_rate(&self) -> f64 {
        if self.min_period == u64::MAX {
            0.0
        } else {
            f64::from(self.clock_hz) / self.min_period as f64
        }
    }

    pub fn spindle(&self) -> f32 {
        self.spindle
    }

    pub fn coolant(&self) -> Coolant {
        self.coolant
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_period(&mut self, ticks: u16, prescaler: u16) {
        self.period = (u64::from(ticks) * u64::from(prescaler)).max(1);
        self.min_period = self.min_period.min(self.period);
    }

    pub(crate) fn record_violation(&mut self) {
        self.violations = self.violations.saturating_add(1);
    }
}

impl StepClock for SimBoard {
    fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    fn configure(&mut self, ticks: u16, prescaler: u16) {
        self.set_period(ticks, prescaler);
        self.running = true;
    }

    fn reconfigure(&mut self, ticks: u16, prescaler: u16) {
        self.set_period(ticks, prescaler);
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn mask(&mut self) {
        self.mask_depth += 1;
    }

    fn unmask(&mut self) {
        self.mask_depth = self.mask_depth.saturating_sub(1);
    }
}

impl StepperOutputs for SimBoard {
    fn step(&mut self, mask: StepperMask) {
        if self.stepping {
            self.record_violation();
        }
        self.stepping = true;
        for i in 0..STEPPER_COUNT {
            if mask.has(i) {
                self.pulses[i] += 1;
                self.position[i] += if self.directions.has(i) { -1 } else { 1 };
            }
        }
    }

    fn clear_steps(&mut self) {
        self.stepping = false;
    }

    fn set_directions(&mut self, mask: StepperMask) {
        self.directions = mask;
    }

    fn enable(&mut self, on: bool) {
        self.enabled = on;
    }
}

impl SwitchInputs for SimBoard {
    fn limits(&self) -> StepperMask {
        let mut mask = StepperMask::empty();
        for switch in self.limit_switches.iter().flatten() {
            if switch.closed(&self.position) {
                mask |= StepperMask::of(switch.stepper);
            }
        }
        mask
    }

    fn controls(&self) -> ControlInputs {
        self.controls
    }

    fn probe(&self) -> bool {
        match self.probe_override {
            Some(state) => state,
            None => self
                .probe_switch
                .is_some_and(|switch| switch.closed(&self.position)),
        }
    }
}

impl ToolDriver for SimBoard {
    fn set_spindle(&mut self, rpm: f32) {
        self.spindle = rpm;
    }

    fn set_coolant(&mut self, coolant: Coolant) {
        self.coolant = coolant;
    }
}

// ─── Runner ─────────────────────────────────────────────────────────

/// Drives a [`Machine`] on a [`SimBoard`] through simulated time.
pub struct SimRunner {
    pub machine: Machine<SimBoard>,
    /// Current time [source cycles].
    now: u64,
    next_step: Option<u64>,
    next_background: u64,
    background_period: u64,
    limits: StepperMask,
    controls: ControlInputs,
    probe: bool,
    ticks: u64,
}

impl SimRunner {
    pub fn new(machine: Machine<SimBoard>) -> Self {
        let clock_hz = f64::from(machine.board().clock_hz());
        let background_period = ((BACKGROUND_PERIOD * clock_hz) as u64).max(1);
        let limits = machine.board().limits();
        let controls = machine.board().controls();
        let probe = machine.board().probe();
        Self {
            machine,
            now: 0,
            next_step: None,
            next_background: 0,
            background_period,
            limits,
            controls,
            probe,
            ticks: 0,
        }
    }

    /// Build a machine on a fresh board.
    pub fn from_settings(settings: Settings) -> Self {
        let board = SimBoard::new(&settings);
        Self::new(Machine::new(settings, board))
    }

    /// Simulated time [s].
    pub fn elapsed(&self) -> f64 {
        self.now as f64 / f64::from(self.machine.board().clock_hz())
    }

    /// Step-assert callbacks fired so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn board(&self) -> &SimBoard {
        self.machine.board()
    }

    // ─── Stimuli ────────────────────────────────────────────────────

    /// Change the control inputs and fire the edge handler.
    pub fn set_controls(&mut self, controls: ControlInputs) {
        self.machine.board_mut().set_controls(controls);
        self.poll_inputs();
    }

    /// Feed a byte to the real-time command channel.
    pub fn inject(&mut self, byte: u8) -> bool {
        self.machine.inject_realtime(byte)
    }

    /// Change the board and fire any input edges the change caused.
    pub fn with_board(&mut self, f: impl FnOnce(&mut SimBoard)) {
        f(self.machine.board_mut());
        self.poll_inputs();
    }

    // ─── Running ────────────────────────────────────────────────────

    /// Advance simulated time by `seconds`.
    pub fn run_for(&mut self, seconds: f64) {
        let end = self.now + self.cycles(seconds);
        while self.advance(end) {}
    }

    /// Run until `done` holds, checked after every background pass.
    ///
    /// Returns the simulated time it took [s].
    pub fn run_until(
        &mut self,
        max_seconds: f64,
        mut done: impl FnMut(&Machine<SimBoard>) -> bool,
    ) -> Result<f64, SimError> {
        let start = self.now;
        let end = self.now + self.cycles(max_seconds);
        loop {
            let background = self.next_background;
            if !self.advance(end) {
                return Err(SimError::Timeout {
                    seconds: max_seconds,
                });
            }
            if self.next_background != background && done(&self.machine) {
                let clock_hz = f64::from(self.machine.board().clock_hz());
                return Ok((self.now - start) as f64 / clock_hz);
            }
        }
    }

    /// Run until every queued move has been executed.
    pub fn run_until_idle(&mut self, max_seconds: f64) -> Result<f64, SimError> {
        self.run_until(max_seconds, |m| m.is_idle() && !m.board().is_running())
    }

    fn cycles(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.machine.board().clock_hz())) as u64
    }

    /// Process the next event before `end`. Returns `false` once `end` is
    /// reached.
    fn advance(&mut self, end: u64) -> bool {
        let step_due = self.next_step.filter(|&t| t <= self.next_background);
        let at = step_due.unwrap_or(self.next_background);
        if at > end {
            self.now = end;
            return false;
        }
        self.now = at;

        if step_due.is_some() {
            self.step_tick();
        } else {
            self.machine.run_background();
            self.next_background = self.now + self.background_period;
            self.poll_inputs();
        }
        self.schedule_step();
        true
    }

    fn step_tick(&mut self) {
        if self.machine.board().mask_depth() > 0 {
            self.machine.board_mut().record_violation();
        }
        self.ticks += 1;
        self.machine.on_step_assert();
        self.machine.on_step_reset();
        self.next_step = None;
        self.poll_inputs();
    }

    fn schedule_step(&mut self) {
        let board = self.machine.board();
        if !board.is_running() {
            self.next_step = None;
        } else if self.next_step.is_none() {
            self.next_step = Some(self.now + board.period_cycles());
        }
    }

    /// Fire the handlers of inputs that changed since the last look.
    fn poll_inputs(&mut self) {
        let board = self.machine.board();
        let (limits, controls, probe) = (board.limits(), board.controls(), board.probe());

        if controls != self.controls {
            self.controls = controls;
            trace!(?controls, "Controls changed");
            self.machine.on_controls_changed();
        }
        if limits != self.limits {
            self.limits = limits;
            trace!(?limits, "Limits changed");
            self.machine.on_limits_changed();
        }
        if probe != self.probe {
            self.probe = probe;
            if probe {
                self.machine.on_probe_tripped();
            }
        }
    }
}
