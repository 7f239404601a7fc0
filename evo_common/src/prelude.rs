//! Prelude module for common re-exports.
//!
//! ```rust
//! use evo_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::motion::config::{KinematicsConfig, MotionConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{AXIS_COUNT, PLANNER_BUFFER_SIZE, SEGMENT_BUFFER_SIZE, STEPPER_COUNT};

// ─── Motion Types ───────────────────────────────────────────────────
pub use crate::motion::block::{BlockFlags, BlockRequest, Coolant, StepperMask, ToolState};
pub use crate::motion::overrides::{Overrides, RtCommand};
pub use crate::motion::state::{AlarmCode, ExecState, MachineStatus};
pub use crate::motion::telemetry::{BufferCounters, ProbeResult, StatusSnapshot};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::{Board, ControlInputs, StepClock, StepperOutputs, SwitchInputs, ToolDriver};
