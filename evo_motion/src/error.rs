//! Error types at each background boundary.
//!
//! The step-clock callbacks and input handlers never return errors; they
//! set execution-state bits and an [`AlarmCode`] that the background loop
//! reports. Everything here is raised from background context only.

use evo_common::consts::{AXIS_COUNT, MAX_BLOCK_STEPS};
use evo_common::motion::state::AlarmCode;
use thiserror::Error;

/// Planner enqueue rejection.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EnqueueError {
    /// Every slot is occupied. Backpressure: retry once a block completes.
    #[error("planner queue full")]
    QueueFull,

    /// The request moves no stepper.
    #[error("block has zero length")]
    ZeroLength,

    /// A speed parameter is NaN or infinite.
    #[error("non-finite {0}")]
    NonFinite(&'static str),

    /// A speed parameter is zero or negative.
    #[error("{0} must be positive")]
    InvalidParameter(&'static str),

    /// Dominant step count exceeds the accumulator range.
    #[error("block of {steps} steps exceeds {}", MAX_BLOCK_STEPS)]
    BlockTooLong { steps: u32 },
}

impl EnqueueError {
    /// Whether the caller should simply retry later.
    #[inline]
    pub const fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}

/// Coordinate transform failure.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum KinematicsError {
    /// The geometry cannot reach this position.
    #[error("position {position:?} unreachable")]
    Unreachable { position: [f32; AXIS_COUNT] },

    /// A stepper position does not fit the step counter.
    #[error("stepper {stepper} position overflows the step counter")]
    StepOverflow { stepper: usize },
}

/// Motion request rejection (motion-control boundary).
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum MotionError {
    /// Target outside configured travel; no motion was queued.
    #[error("target {target:?} outside travel limits")]
    SoftLimit { target: [f32; AXIS_COUNT] },

    /// An alarm, halt, kill or open door blocks new motion.
    #[error("motion locked{}", .alarm.map(|a| format!(" by {a}")).unwrap_or_default())]
    Locked { alarm: Option<AlarmCode> },

    /// Homing is enabled and the machine has not been homed.
    #[error("homing required")]
    Unhomed,

    /// A previously accepted line is still waiting for planner space.
    #[error("previous motion still pending")]
    Busy,

    /// Requested feed rate is not positive and finite.
    #[error("invalid feed rate {0}")]
    InvalidFeed(f32),

    /// The probe input is already closed before the probing move.
    #[error("probe already triggered")]
    ProbeTriggered,

    /// Homing was requested but is not configured.
    #[error("homing disabled")]
    HomingDisabled,

    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}

/// Reset refused because the alarm source is still present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResetError {
    #[error("emergency stop still asserted")]
    EstopActive,

    #[error("limit input still active")]
    LimitsActive,
}
