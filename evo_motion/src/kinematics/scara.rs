//! Two-link SCARA arm with a linear Z.
//!
//! Stepper 0 drives the shoulder, stepper 1 the elbow (relative to the
//! inner link), both in degrees: `steps_per_mm` is read as steps per degree
//! for these channels. The inverse map uses the positive-elbow solution.

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::{HOME_ORDER, HomeSequence, Kinematics, Travel, single_axis_step, to_steps};
use crate::config::Settings;
use crate::error::KinematicsError;

#[derive(Debug, Clone)]
pub struct Scara {
    steps_per_unit: [f32; STEPPER_COUNT],
    inner: f64,
    outer: f64,
    max_segment_length: f32,
    travel: Travel,
    home_positive: [bool; AXIS_COUNT],
}

impl Scara {
    pub fn new(settings: &Settings, inner_arm: f32, outer_arm: f32, max_segment_length: f32) -> Self {
        let mut home_positive = [false; AXIS_COUNT];
        for (i, p) in home_positive.iter_mut().enumerate() {
            *p = settings.homing.homes_positive(i);
        }
        Self {
            steps_per_unit: settings.steppers.map(|s| s.steps_per_mm),
            inner: inner_arm as f64,
            outer: outer_arm as f64,
            max_segment_length,
            travel: Travel::from_settings(settings),
            home_positive,
        }
    }

    /// Joint angles [deg] for a planar position.
    pub fn joint_angles(&self, x: f32, y: f32) -> Option<(f64, f64)> {
        let (x, y) = (x as f64, y as f64);
        let (l1, l2) = (self.inner, self.outer);
        let c2 = (x * x + y * y - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
        if !c2.is_finite() || c2.abs() > 1.0 + 1e-9 {
            return None;
        }
        let elbow = c2.clamp(-1.0, 1.0).acos();
        let shoulder = y.atan2(x) - (l2 * elbow.sin()).atan2(l1 + l2 * elbow.cos());
        Some((shoulder.to_degrees(), elbow.to_degrees()))
    }
}

impl Kinematics for Scara {
    fn name(&self) -> &'static str {
        "scara"
    }

    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError> {
        let (shoulder, elbow) =
            self.joint_angles(position[0], position[1])
                .ok_or(KinematicsError::Unreachable {
                    position: *position,
                })?;
        let mut steps = [0; STEPPER_COUNT];
        steps[0] = to_steps(shoulder as f32, self.steps_per_unit[0], 0)?;
        steps[1] = to_steps(elbow as f32, self.steps_per_unit[1], 1)?;
        steps[2] = to_steps(position[2], self.steps_per_unit[2], 2)?;
        Ok(steps)
    }

    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT] {
        let shoulder = (steps[0] as f64 / self.steps_per_unit[0] as f64).to_radians();
        let elbow = (steps[1] as f64 / self.steps_per_unit[1] as f64).to_radians();
        let x = self.inner * shoulder.cos() + self.outer * (shoulder + elbow).cos();
        let y = self.inner * shoulder.sin() + self.outer * (shoulder + elbow).sin();
        [
            x as f32,
            y as f32,
            steps[2] as f32 / self.steps_per_unit[2],
        ]
    }

    fn max_segment_length(&self) -> Option<f32> {
        Some(self.max_segment_length)
    }

    fn home_sequence(&self) -> HomeSequence {
        let mut sequence = HomeSequence::new();
        // X homes the shoulder, Y the elbow.
        for axis in HOME_ORDER {
            let _ = sequence.push(single_axis_step(
                axis,
                StepperMask::of(axis),
                self.home_positive[axis],
            ));
        }
        sequence
    }

    /// Both joints at their zero angle: arm stretched along +X.
    fn home_position(&self) -> [f32; AXIS_COUNT] {
        [
            (self.inner + self.outer) as f32,
            0.0,
            self.travel.home_end(2, self.home_positive[2]),
        ]
    }

    fn travel(&self) -> &Travel {
        &self.travel
    }
}
