//! Kinematics transform layer.
//!
//! Maps machine-space coordinates (mm) to stepper positions (steps) and back,
//! and carries the machine-geometry knowledge the rest of the core must not
//! depend on: homing order, dual-drive locking and the maximum straight
//! sub-segment length for geometries whose inverse map is non-linear.
//!
//! ## Geometries
//!
//! | Type | Steppers | Segmented | Dual drive |
//! |------|----------|-----------|------------|
//! | [`Cartesian`] | 3 (+1) | no | optional |
//! | [`CoreXy`] | 3 | no | no |
//! | [`LinearDelta`] | 3 | yes | no |
//! | [`Scara`] | 3 | yes | no |
//! | [`Polar`] | 3 | yes | no |
//!
//! The geometry is selected once at startup by [`build`]; the rest of the
//! core only sees `dyn Kinematics`.

pub mod cartesian;
pub mod corexy;
pub mod delta;
pub mod polar;
pub mod scara;

use core::iter::FusedIterator;

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;
use evo_common::motion::config::KinematicsConfig;

use crate::config::Settings;
use crate::error::KinematicsError;

pub use cartesian::Cartesian;
pub use corexy::CoreXy;
pub use delta::LinearDelta;
pub use polar::Polar;
pub use scara::Scara;

// ─── Homing Order ───────────────────────────────────────────────────

/// One homing pass: which axes are referenced, which limit inputs end the
/// approach, and the stepper-space approach direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingStep {
    /// Machine axes referenced by this pass (bit per axis).
    pub axes: u8,
    /// Limit inputs that must all trip to end the approach.
    pub limit_mask: StepperMask,
    /// Approach direction per stepper channel: -1, 0 or +1.
    pub direction: [i8; STEPPER_COUNT],
}

/// Ordered homing passes.
pub type HomeSequence = heapless::Vec<HomingStep, AXIS_COUNT>;

/// Default pass order: Z clears the work first, then X, then Y.
pub const HOME_ORDER: [usize; AXIS_COUNT] = [2, 0, 1];

/// Travel bounds in machine space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Travel {
    pub min: [f32; AXIS_COUNT],
    pub max: [f32; AXIS_COUNT],
}

impl Travel {
    /// Bounds from runtime settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min: settings.min_travel,
            max: settings.max_travel,
        }
    }

    /// Coordinate of the homing end of axis `index`.
    #[inline]
    pub fn home_end(&self, index: usize, positive: bool) -> f32 {
        if positive {
            self.max[index]
        } else {
            self.min[index]
        }
    }
}

// ─── Kinematics Trait ───────────────────────────────────────────────

/// Machine-space ⇄ stepper-space transform.
///
/// Implementations are pure per call and hold only read-only geometry.
pub trait Kinematics: Send {
    /// Geometry name for logs.
    fn name(&self) -> &'static str;

    /// Machine position [mm] to absolute stepper positions [steps].
    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError>;

    /// Stepper positions [steps] to machine position [mm].
    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT];

    /// Longest straight sub-segment that keeps the tool on a straight
    /// machine-space line. `None` for linear geometries.
    fn max_segment_length(&self) -> Option<f32> {
        None
    }

    /// Split a straight move into waypoints no longer than
    /// [`Kinematics::max_segment_length`]. The start point is not yielded;
    /// the end point always is.
    fn segment_motion(&self, start: [f32; AXIS_COUNT], end: [f32; AXIS_COUNT]) -> SegmentIter {
        SegmentIter::new(start, end, self.max_segment_length())
    }

    /// Homing passes in execution order.
    fn home_sequence(&self) -> HomeSequence;

    /// Machine position after the last homing pull-off.
    fn home_position(&self) -> [f32; AXIS_COUNT];

    /// Steppers to hold still given the tripped limit inputs during homing.
    /// Empty for geometries without redundant drives.
    fn lock_axes(&self, limit_mask: StepperMask) -> StepperMask {
        let _ = limit_mask;
        StepperMask::empty()
    }

    /// Configured travel bounds.
    fn travel(&self) -> &Travel;

    /// Whether `position` lies inside the configured travel.
    fn within_travel_bounds(&self, position: &[f32; AXIS_COUNT]) -> bool {
        let travel = self.travel();
        position
            .iter()
            .zip(travel.min.iter().zip(&travel.max))
            .all(|(&p, (&lo, &hi))| p.is_finite() && p >= lo && p <= hi)
    }
}

/// Build the configured geometry.
pub fn build(settings: &Settings) -> Box<dyn Kinematics> {
    match settings.kinematics {
        KinematicsConfig::Cartesian { dual_drive_axis } => Box::new(Cartesian::new(
            settings,
            dual_drive_axis.map(|a| a as usize),
        )),
        KinematicsConfig::CoreXy => Box::new(CoreXy::new(settings)),
        KinematicsConfig::LinearDelta {
            arm_length,
            radius,
            max_segment_length,
        } => Box::new(LinearDelta::new(
            settings,
            arm_length,
            radius,
            max_segment_length,
        )),
        KinematicsConfig::Scara {
            inner_arm,
            outer_arm,
            max_segment_length,
        } => Box::new(Scara::new(settings, inner_arm, outer_arm, max_segment_length)),
        KinematicsConfig::Polar { max_segment_length } => {
            Box::new(Polar::new(settings, max_segment_length))
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Round a coordinate to whole steps on `stepper`.
#[inline]
pub(crate) fn to_steps(value: f32, steps_per_unit: f32, stepper: usize) -> Result<i32, KinematicsError> {
    let steps = (value * steps_per_unit).round();
    if !steps.is_finite() || steps.abs() >= i32::MAX as f32 {
        return Err(KinematicsError::StepOverflow { stepper });
    }
    Ok(steps as i32)
}

/// Homing pass driving `steppers` toward the `axis` end selected by settings.
pub(crate) fn single_axis_step(axis: usize, steppers: StepperMask, positive: bool) -> HomingStep {
    let sign = if positive { 1 } else { -1 };
    let mut direction = [0i8; STEPPER_COUNT];
    for (i, d) in direction.iter_mut().enumerate() {
        if steppers.has(i) {
            *d = sign;
        }
    }
    HomingStep {
        axes: 1 << axis,
        limit_mask: steppers,
        direction,
    }
}

// ─── Segment Iterator ───────────────────────────────────────────────

/// Lazy, finite sequence of waypoints along a straight machine-space move.
///
/// Consumed once; not restartable.
#[derive(Debug)]
pub struct SegmentIter {
    start: [f32; AXIS_COUNT],
    delta: [f32; AXIS_COUNT],
    count: u32,
    next: u32,
}

impl SegmentIter {
    /// Waypoints from `start` (exclusive) to `end` (inclusive).
    pub fn new(start: [f32; AXIS_COUNT], end: [f32; AXIS_COUNT], max_len: Option<f32>) -> Self {
        let mut delta = [0.0; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            delta[i] = end[i] - start[i];
        }
        let length = delta.iter().map(|d| d * d).sum::<f32>().sqrt();
        let count = match max_len {
            Some(max) if max > 0.0 && length > max => (length / max).ceil() as u32,
            _ => 1,
        };
        Self {
            start,
            delta,
            count,
            next: 0,
        }
    }

    /// Total waypoints in the sequence.
    #[inline]
    pub fn count_total(&self) -> u32 {
        self.count
    }
}

impl Iterator for SegmentIter {
    type Item = [f32; AXIS_COUNT];

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        self.next += 1;
        let mut point = [0.0; AXIS_COUNT];
        if self.next == self.count {
            for i in 0..AXIS_COUNT {
                point[i] = self.start[i] + self.delta[i];
            }
        } else {
            let t = self.next as f32 / self.count as f32;
            for i in 0..AXIS_COUNT {
                point[i] = self.start[i] + self.delta[i] * t;
            }
        }
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SegmentIter {}
impl FusedIterator for SegmentIter {}
