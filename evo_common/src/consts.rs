//! System-wide constants for the EVO step-motion workspace.
//!
//! Single source of truth for all fixed capacities and numeric bounds.
//! Everything the step clock touches is sized from these values at compile
//! time, so the real-time path never allocates.

use static_assertions::const_assert;

/// Number of machine-space (Cartesian/tool) axes: X, Y, Z.
pub const AXIS_COUNT: usize = 3;

/// Number of physical stepper channels.
pub const STEPPER_COUNT: usize = 4;

/// Planner ring capacity (motion blocks).
pub const PLANNER_BUFFER_SIZE: usize = 16;

/// Interpolator segment ring capacity.
pub const SEGMENT_BUFFER_SIZE: usize = 10;

/// Highest Dynamic Step Spread level (oversampling factor `1 << level`).
pub const MAX_DSS_LEVEL: u8 = 5;

/// Largest dominant-axis step count accepted for a single block.
pub const MAX_BLOCK_STEPS: u32 = 1 << 25;

/// Axis names used in logs and reports.
pub const AXIS_NAMES: [char; AXIS_COUNT] = ['X', 'Y', 'Z'];

// ─── Timing Bounds ──────────────────────────────────────────────────

/// Lowest step-clock source frequency [Hz].
pub const STEP_CLOCK_HZ_MIN: u32 = 1_000_000;
/// Highest step-clock source frequency [Hz].
pub const STEP_CLOCK_HZ_MAX: u32 = 500_000_000;

/// Lowest segment (interpolation) rate [Hz].
pub const SEGMENT_RATE_HZ_MIN: u32 = 20;
/// Highest segment (interpolation) rate [Hz].
pub const SEGMENT_RATE_HZ_MAX: u32 = 1000;

/// Absolute floor for the configured minimum step rate [Hz].
pub const F_STEP_MIN_LIMIT: f32 = 1.0;
/// Absolute ceiling for the configured maximum step rate [Hz].
pub const F_STEP_MAX_LIMIT: f32 = 200_000.0;

/// Longest step pulse [µs].
pub const STEP_PULSE_US_MAX: u16 = 100;

const_assert!(PLANNER_BUFFER_SIZE > 1);
const_assert!(SEGMENT_BUFFER_SIZE > 1);
const_assert!(STEPPER_COUNT <= 8);
const_assert!(AXIS_COUNT <= STEPPER_COUNT);
const_assert!(MAX_DSS_LEVEL <= 5);
// Bresenham accumulators hold `steps << MAX_DSS_LEVEL` and may double before
// correction; that must stay within a u32.
const_assert!(((MAX_BLOCK_STEPS as u64) << (MAX_DSS_LEVEL as u64 + 1)) <= u32::MAX as u64);
