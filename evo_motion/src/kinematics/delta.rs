//! Linear delta: three vertical towers with parallel arms.
//!
//! Towers stand at 210°, 330° and 90° on a circle of `radius` (tower radius
//! minus effector offset). Carriage height for tower `i`:
//!
//! ```text
//! h_i = z + sqrt(L² - (x - tx_i)² - (y - ty_i)²)
//! ```
//!
//! The forward map intersects three spheres of radius `L` centred on the
//! carriages and picks the solution below them. Straight machine moves bow
//! in tower space, so moves are split into short sub-segments.

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::{HomeSequence, HomingStep, Kinematics, Travel, to_steps};
use crate::config::Settings;
use crate::error::KinematicsError;

const TOWER_ANGLES_DEG: [f64; 3] = [210.0, 330.0, 90.0];
const TOWERS: StepperMask = StepperMask::from_bits_truncate(0b0111);

type Vec3 = [f64; 3];

#[inline]
fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn scale(a: Vec3, k: f64) -> Vec3 {
    [a[0] * k, a[1] * k, a[2] * k]
}

#[inline]
fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[derive(Debug, Clone)]
pub struct LinearDelta {
    steps_per_mm: [f32; STEPPER_COUNT],
    arm_length: f64,
    towers: [[f64; 2]; 3],
    max_segment_length: f32,
    travel: Travel,
}

impl LinearDelta {
    pub fn new(settings: &Settings, arm_length: f32, radius: f32, max_segment_length: f32) -> Self {
        let radius = radius as f64;
        let towers = TOWER_ANGLES_DEG.map(|deg: f64| {
            let rad = deg.to_radians();
            [radius * rad.cos(), radius * rad.sin()]
        });
        Self {
            steps_per_mm: settings.steppers.map(|s| s.steps_per_mm),
            arm_length: arm_length as f64,
            towers,
            max_segment_length,
            travel: Travel::from_settings(settings),
        }
    }

    /// Carriage heights [mm] for a machine position.
    pub fn carriage_heights(&self, position: &[f32; AXIS_COUNT]) -> Option<[f64; 3]> {
        let (x, y, z) = (position[0] as f64, position[1] as f64, position[2] as f64);
        let l2 = self.arm_length * self.arm_length;
        let mut heights = [0.0; 3];
        for (h, [tx, ty]) in heights.iter_mut().zip(self.towers) {
            let r2 = l2 - (x - tx).powi(2) - (y - ty).powi(2);
            if !(r2 > 0.0) {
                return None;
            }
            *h = z + r2.sqrt();
        }
        Some(heights)
    }
}

impl Kinematics for LinearDelta {
    fn name(&self) -> &'static str {
        "linear_delta"
    }

    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError> {
        let heights = self
            .carriage_heights(position)
            .ok_or(KinematicsError::Unreachable {
                position: *position,
            })?;
        let mut steps = [0; STEPPER_COUNT];
        for (i, h) in heights.iter().enumerate() {
            steps[i] = to_steps(*h as f32, self.steps_per_mm[i], i)?;
        }
        Ok(steps)
    }

    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT] {
        let carriage = |i: usize| -> Vec3 {
            [
                self.towers[i][0],
                self.towers[i][1],
                steps[i] as f64 / self.steps_per_mm[i] as f64,
            ]
        };
        let (p1, p2, p3) = (carriage(0), carriage(1), carriage(2));

        let d12 = sub(p2, p1);
        let d = dot(d12, d12).sqrt();
        let ex = scale(d12, 1.0 / d);
        let d13 = sub(p3, p1);
        let i = dot(ex, d13);
        let ey_raw = sub(d13, scale(ex, i));
        let j = dot(ey_raw, ey_raw).sqrt();
        let ey = scale(ey_raw, 1.0 / j);
        let ez = cross(ex, ey);

        let x = 0.5 * d;
        let y = (0.5 * (i * i + j * j) - i * x) / j;
        let z = (self.arm_length * self.arm_length - x * x - y * y)
            .max(0.0)
            .sqrt();

        let mut out = [0.0; AXIS_COUNT];
        for k in 0..AXIS_COUNT {
            out[k] = (p1[k] + ex[k] * x + ey[k] * y - ez[k] * z) as f32;
        }
        out
    }

    fn max_segment_length(&self) -> Option<f32> {
        Some(self.max_segment_length)
    }

    fn home_sequence(&self) -> HomeSequence {
        let mut sequence = HomeSequence::new();
        // All carriages rise together; each stops at its own switch.
        let _ = sequence.push(HomingStep {
            axes: 0b100,
            limit_mask: TOWERS,
            direction: [1, 1, 1, 0],
        });
        sequence
    }

    fn home_position(&self) -> [f32; AXIS_COUNT] {
        [0.0, 0.0, self.travel.max[2]]
    }

    fn lock_axes(&self, limit_mask: StepperMask) -> StepperMask {
        limit_mask & TOWERS
    }

    fn travel(&self) -> &Travel {
        &self.travel
    }
}
