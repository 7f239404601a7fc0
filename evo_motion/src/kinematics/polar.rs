//! Polar (r-theta) table with a linear Z.
//!
//! Stepper 0 drives the radius [mm], stepper 1 the rotation [deg], stepper 2
//! the Z axis. The rotation follows `atan2`, so a move crossing the -X axis
//! unwinds through a full turn instead of taking the short way round.

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::{HOME_ORDER, HomeSequence, Kinematics, Travel, single_axis_step, to_steps};
use crate::config::Settings;
use crate::error::KinematicsError;

#[derive(Debug, Clone)]
pub struct Polar {
    steps_per_unit: [f32; STEPPER_COUNT],
    max_segment_length: f32,
    travel: Travel,
    home_positive: [bool; AXIS_COUNT],
}

impl Polar {
    pub fn new(settings: &Settings, max_segment_length: f32) -> Self {
        let mut home_positive = [false; AXIS_COUNT];
        for (i, p) in home_positive.iter_mut().enumerate() {
            *p = settings.homing.homes_positive(i);
        }
        Self {
            steps_per_unit: settings.steppers.map(|s| s.steps_per_mm),
            max_segment_length,
            travel: Travel::from_settings(settings),
            home_positive,
        }
    }
}

impl Kinematics for Polar {
    fn name(&self) -> &'static str {
        "polar"
    }

    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError> {
        let (x, y) = (position[0] as f64, position[1] as f64);
        let radius = x.hypot(y);
        let angle = y.atan2(x).to_degrees();
        let mut steps = [0; STEPPER_COUNT];
        steps[0] = to_steps(radius as f32, self.steps_per_unit[0], 0)?;
        steps[1] = to_steps(angle as f32, self.steps_per_unit[1], 1)?;
        steps[2] = to_steps(position[2], self.steps_per_unit[2], 2)?;
        Ok(steps)
    }

    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT] {
        let radius = steps[0] as f64 / self.steps_per_unit[0] as f64;
        let angle = (steps[1] as f64 / self.steps_per_unit[1] as f64).to_radians();
        [
            (radius * angle.cos()) as f32,
            (radius * angle.sin()) as f32,
            steps[2] as f32 / self.steps_per_unit[2],
        ]
    }

    fn max_segment_length(&self) -> Option<f32> {
        Some(self.max_segment_length)
    }

    fn home_sequence(&self) -> HomeSequence {
        let mut sequence = HomeSequence::new();
        for axis in HOME_ORDER {
            let _ = sequence.push(single_axis_step(
                axis,
                StepperMask::of(axis),
                self.home_positive[axis],
            ));
        }
        sequence
    }

    /// Rotation at zero, radius and Z at their homing ends.
    fn home_position(&self) -> [f32; AXIS_COUNT] {
        [
            self.travel.home_end(0, self.home_positive[0]).max(0.0),
            0.0,
            self.travel.home_end(2, self.home_positive[2]),
        ]
    }

    fn travel(&self) -> &Travel {
        &self.travel
    }
}
