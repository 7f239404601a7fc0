//! Live telemetry types.
//!
//! Everything here is a plain snapshot: the core fills it from background
//! context and hands it to whatever formats status reports.

use serde::{Deserialize, Serialize};

use crate::consts::{AXIS_COUNT, STEPPER_COUNT};

use super::overrides::Overrides;
use super::state::{AlarmCode, MachineStatus};

/// Buffer occupancy and flow-control counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCounters {
    /// Blocks waiting in the planner (including the one executing).
    pub planner_queued: usize,
    /// Free planner slots.
    pub planner_free: usize,
    /// Planner capacity.
    pub planner_capacity: usize,
    /// Enqueue attempts refused because the planner was full.
    pub rejected_full: u32,
    /// Look-ahead passes run since start-up.
    pub replans: u32,
    /// Segments waiting for the step clock.
    pub segments_queued: usize,
    /// Times the step clock found the segment buffer empty while running.
    pub underruns: u32,
}

/// Result of the most recent probing move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Stepper position latched at contact.
    pub steps: [i32; STEPPER_COUNT],
    /// Machine position at contact [mm].
    pub position: [f32; AXIS_COUNT],
    /// Contact was made.
    pub success: bool,
}

/// One status report worth of state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Reported machine status.
    pub status: MachineStatus,
    /// Latched alarm, if any.
    pub alarm: Option<AlarmCode>,
    /// Machine position from the real-time step counters [mm].
    pub position: [f32; AXIS_COUNT],
    /// Real-time step counters.
    pub steps: [i32; STEPPER_COUNT],
    /// Feed rate of the executing segment [mm/min].
    pub feed: f32,
    /// Spindle speed after override [rpm].
    pub spindle: f32,
    /// Override percentages.
    pub overrides: Overrides,
    /// Buffer counters.
    pub buffers: BufferCounters,
    /// Last probe result.
    pub probe: Option<ProbeResult>,
}
