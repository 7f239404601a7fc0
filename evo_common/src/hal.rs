//! Hardware capability traits.
//!
//! The motion core never touches registers. A target board implements one
//! trait per logical role and the core talks to the [`Board`] union.
//!
//! # Timing Contracts
//!
//! | Method | Called from | Constraint |
//! |--------|-------------|------------|
//! | `StepperOutputs::*` | step-assert / step-reset | **HARD**, a few cycles |
//! | `StepClock::reconfigure` | step-assert | **HARD** |
//! | `StepClock::configure`, `stop` | both contexts | bounded |
//! | `StepClock::mask`, `unmask` | background | bounded, nestable once |
//! | `SwitchInputs::*` | input edge handlers | bounded |
//! | `ToolDriver::*` | background (prep) | none |

use bitflags::bitflags;

use crate::motion::block::{Coolant, StepperMask};

bitflags! {
    /// Operator control inputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlInputs: u8 {
        /// Emergency stop (kill).
        const ESTOP       = 0x01;
        /// Safety door open.
        const SAFETY_DOOR = 0x02;
        /// Feed hold button.
        const FEED_HOLD   = 0x04;
        /// Cycle start button.
        const CYCLE_START = 0x08;
    }
}

impl Default for ControlInputs {
    fn default() -> Self {
        Self::empty()
    }
}

/// Periodic step clock with a paired step-reset event.
///
/// The clock fires step-assert every `ticks * prescaler` source cycles and
/// step-reset half a period later.
pub trait StepClock {
    /// Source frequency of the clock [Hz].
    fn clock_hz(&self) -> u32;

    /// Start the clock with the given period.
    fn configure(&mut self, ticks: u16, prescaler: u16);

    /// Change the period of a running clock; takes effect at the next tick.
    fn reconfigure(&mut self, ticks: u16, prescaler: u16);

    /// Stop the clock. No further callbacks fire after this returns.
    fn stop(&mut self);

    /// Whether the clock is running.
    fn is_running(&self) -> bool;

    /// Hold off step-clock callbacks (critical section entry).
    fn mask(&mut self);

    /// Release callbacks held off by [`StepClock::mask`].
    fn unmask(&mut self);
}

/// Step, direction and enable lines.
pub trait StepperOutputs {
    /// Assert the step lines in `mask`.
    fn step(&mut self, mask: StepperMask);

    /// Deassert all step lines.
    fn clear_steps(&mut self);

    /// Set direction lines; a set bit means negative direction.
    fn set_directions(&mut self, mask: StepperMask);

    /// Enable or disable the drivers.
    fn enable(&mut self, on: bool);
}

/// Limit, control and probe inputs.
pub trait SwitchInputs {
    /// Tripped limit switches, one bit per stepper channel.
    fn limits(&self) -> StepperMask;

    /// Active control inputs.
    fn controls(&self) -> ControlInputs;

    /// Probe contact.
    fn probe(&self) -> bool;
}

/// Spindle and coolant outputs.
pub trait ToolDriver {
    /// Set spindle speed [rpm]; sign selects the direction, 0 stops.
    fn set_spindle(&mut self, rpm: f32);

    /// Set coolant outputs.
    fn set_coolant(&mut self, coolant: Coolant);
}

/// Everything the motion core needs from a target board.
pub trait Board: StepClock + StepperOutputs + SwitchInputs + ToolDriver {}

impl<T: StepClock + StepperOutputs + SwitchInputs + ToolDriver> Board for T {}
