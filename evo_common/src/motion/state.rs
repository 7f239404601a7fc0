//! Execution state, reported machine status and alarm codes.
//!
//! `ExecState` is a bitmask: several bits can be set at once (a feed hold
//! raised while a door is open, a halt latched during homing). Externally
//! exactly one [`MachineStatus`] is reported, chosen by priority:
//!
//! `kill/halt > door > hold > homing/jog > run > idle`
//!
//! HALT and KILL are left only through an explicit reset.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Process-wide execution state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecState: u16 {
        /// Motion is executing (step clock running or segments pending).
        const RUN      = 0x0001;
        /// Resuming from a hold; cleared once the step clock restarts.
        const RESUMING = 0x0002;
        /// Feed hold requested or parked.
        const HOLD     = 0x0004;
        /// Jog motion in progress.
        const JOG      = 0x0008;
        /// Homing cycle in progress.
        const HOMING   = 0x0010;
        /// Safety door open.
        const DOOR     = 0x0020;
        /// Machine has not been homed since power-up or alarm.
        const UNHOMED  = 0x0040;
        /// A hard limit input tripped.
        const LIMITS   = 0x0080;
        /// Motion halted by an alarm. **Requires reset.**
        const HALT     = 0x0100;
        /// Emergency stop. **Requires reset.**
        const KILL     = 0x0200;
    }
}

impl ExecState {
    /// Bits that make the reported status an alarm.
    pub const ALARM_MASK: Self =
        Self::from_bits_truncate(Self::HALT.bits() | Self::KILL.bits() | Self::LIMITS.bits());

    /// Bits under which no new motion may be queued.
    pub const MOTION_LOCK_MASK: Self = Self::from_bits_truncate(
        Self::HALT.bits() | Self::KILL.bits() | Self::LIMITS.bits() | Self::DOOR.bits(),
    );

    /// Returns true if any alarm bit is set.
    #[inline]
    pub const fn is_alarm(&self) -> bool {
        self.intersects(Self::ALARM_MASK)
    }
}

impl Default for ExecState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Externally reported machine status (one at a time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MachineStatus {
    /// No motion queued or executing.
    Idle = 0,
    /// Executing queued motion.
    Run = 1,
    /// Executing a jog.
    Jog = 2,
    /// Running the homing cycle.
    Home = 3,
    /// Decelerating into, or parked in, a feed hold.
    Hold = 4,
    /// Safety door open.
    Door = 5,
    /// Alarm (hard limit, emergency stop, homing failure, ...).
    Alarm = 6,
}

impl MachineStatus {
    /// Pick the highest-priority status for the given state bits.
    pub const fn from_exec(state: ExecState) -> Self {
        if state.is_alarm() {
            Self::Alarm
        } else if state.contains(ExecState::DOOR) {
            Self::Door
        } else if state.contains(ExecState::HOLD) {
            Self::Hold
        } else if state.contains(ExecState::HOMING) {
            Self::Home
        } else if state.contains(ExecState::JOG) {
            Self::Jog
        } else if state.contains(ExecState::RUN) {
            Self::Run
        } else {
            Self::Idle
        }
    }

    /// Status label as printed in status reports.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Jog => "Jog",
            Self::Home => "Home",
            Self::Hold => "Hold",
            Self::Door => "Door",
            Self::Alarm => "Alarm",
        }
    }
}

impl Default for MachineStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Alarm raised by a real-time safety trip or a failed cycle.
///
/// Codes follow the Grbl numbering so a protocol layer can forward them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlarmCode {
    /// Hard limit input tripped while moving.
    HardLimit = 1,
    /// Target outside configured travel.
    SoftLimit = 2,
    /// Reset issued while in motion; position may be lost.
    AbortCycle = 3,
    /// Probe already triggered before the probing move.
    ProbeFailInitial = 4,
    /// Probing move finished without contact.
    ProbeFailContact = 5,
    /// Reset issued during homing.
    HomingFailReset = 6,
    /// Safety door opened during homing.
    HomingFailDoor = 7,
    /// Limit still active after pull-off.
    HomingFailPulloff = 8,
    /// Limit switch not found during approach.
    HomingFailApproach = 9,
    /// Emergency stop input asserted.
    EmergencyStop = 10,
}

impl AlarmCode {
    /// Convert from raw `u8`. Returns `None` for unknown codes.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::HardLimit),
            2 => Some(Self::SoftLimit),
            3 => Some(Self::AbortCycle),
            4 => Some(Self::ProbeFailInitial),
            5 => Some(Self::ProbeFailContact),
            6 => Some(Self::HomingFailReset),
            7 => Some(Self::HomingFailDoor),
            8 => Some(Self::HomingFailPulloff),
            9 => Some(Self::HomingFailApproach),
            10 => Some(Self::EmergencyStop),
            _ => None,
        }
    }

    /// Whether the machine must be re-homed after this alarm.
    #[inline]
    pub const fn invalidates_position(&self) -> bool {
        !matches!(self, Self::SoftLimit | Self::ProbeFailInitial | Self::ProbeFailContact)
    }
}

impl core::fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::HardLimit => "hard limit triggered",
            Self::SoftLimit => "soft limit exceeded",
            Self::AbortCycle => "reset while in motion",
            Self::ProbeFailInitial => "probe not in expected initial state",
            Self::ProbeFailContact => "probe did not contact the workpiece",
            Self::HomingFailReset => "homing reset",
            Self::HomingFailDoor => "safety door opened during homing",
            Self::HomingFailPulloff => "pull-off failed to clear limit switch",
            Self::HomingFailApproach => "limit switch not found",
            Self::EmergencyStop => "emergency stop",
        };
        write!(f, "ALARM:{} ({text})", *self as u8)
    }
}
