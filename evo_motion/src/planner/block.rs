//! Planner block storage.

use evo_common::consts::STEPPER_COUNT;
use evo_common::motion::block::{BlockFlags, StepperMask, ToolState};

/// Monotonic block identifier (wraps).
pub type BlockId = u32;

/// One queued linear move in stepper space.
///
/// Geometry fields are fixed at enqueue. Speed fields are owned by the
/// planner; `remaining` is advanced by the interpolator as it slices the
/// block into segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerBlock {
    pub id: BlockId,
    /// Absolute step count per stepper.
    pub steps: [u32; STEPPER_COUNT],
    /// Set bit: stepper moves in the negative direction.
    pub dir_bits: StepperMask,
    /// Dominant step count (`max(steps)`).
    pub step_event_count: u32,
    /// Euclidean length in stepper space [steps].
    pub distance: f32,
    /// Length not yet converted into segments [steps].
    pub remaining: f32,
    /// Signed unit direction in stepper space.
    pub unit: [f32; STEPPER_COUNT],
    /// Programmed cruise speed [steps/s].
    pub nominal_speed: f32,
    /// Highest cruise speed the steppers allow along this direction [steps/s].
    pub max_rate: f32,
    /// Acceleration along the path [steps/s²].
    pub acceleration: f32,
    /// Planned entry speed² [steps²/s²].
    pub entry_speed_sqr: f32,
    /// Entry ceiling from junction and neighbouring nominal speeds.
    pub max_entry_speed_sqr: f32,
    /// Cornering limit at the junction with the previous block.
    pub max_junction_speed_sqr: f32,
    /// Planned exit speed² (the next block's entry, 0 for the last block).
    pub exit_speed_sqr: f32,
    /// Machine length per stepper-space step [mm], for feed reporting.
    pub mm_per_step: f32,
    pub flags: BlockFlags,
    pub tool: ToolState,
    pub line: u32,
}

impl PlannerBlock {
    pub(crate) const EMPTY: Self = Self {
        id: 0,
        steps: [0; STEPPER_COUNT],
        dir_bits: StepperMask::empty(),
        step_event_count: 0,
        distance: 0.0,
        remaining: 0.0,
        unit: [0.0; STEPPER_COUNT],
        nominal_speed: 0.0,
        max_rate: 0.0,
        acceleration: 0.0,
        entry_speed_sqr: 0.0,
        max_entry_speed_sqr: 0.0,
        max_junction_speed_sqr: 0.0,
        exit_speed_sqr: 0.0,
        mm_per_step: 0.0,
        flags: BlockFlags::empty(),
        tool: ToolState {
            spindle: 0.0,
            coolant: evo_common::motion::block::Coolant::empty(),
        },
        line: 0,
    };

    /// Dominant steps per unit of path length.
    #[inline]
    pub fn steps_per_distance(&self) -> f32 {
        self.step_event_count as f32 / self.distance
    }

    /// Whether the block runs at its own speed regardless of overrides.
    #[inline]
    pub fn is_system_motion(&self) -> bool {
        self.flags.contains(BlockFlags::SYSTEM_MOTION)
    }
}
