//! Cartesian gantry, optionally with a second motor on one axis.
//!
//! Axis `i` is driven by stepper `i`. With a dual-drive axis, the spare
//! stepper channel mirrors that axis and carries its own limit switch so
//! homing can square the gantry.

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::{HOME_ORDER, HomeSequence, Kinematics, Travel, single_axis_step, to_steps};
use crate::config::Settings;
use crate::error::KinematicsError;

/// Stepper channel used by the mirrored motor.
pub const DUAL_STEPPER: usize = STEPPER_COUNT - 1;

#[derive(Debug, Clone)]
pub struct Cartesian {
    steps_per_mm: [f32; STEPPER_COUNT],
    dual_axis: Option<usize>,
    travel: Travel,
    home: [f32; AXIS_COUNT],
    home_positive: [bool; AXIS_COUNT],
}

impl Cartesian {
    pub fn new(settings: &Settings, dual_axis: Option<usize>) -> Self {
        let travel = Travel::from_settings(settings);
        let mut home = [0.0; AXIS_COUNT];
        let mut home_positive = [false; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            home_positive[i] = settings.homing.homes_positive(i);
            home[i] = travel.home_end(i, home_positive[i]);
        }
        Self {
            steps_per_mm: settings.steppers.map(|s| s.steps_per_mm),
            dual_axis,
            travel,
            home,
            home_positive,
        }
    }

    fn dual_pair(&self) -> StepperMask {
        match self.dual_axis {
            Some(axis) => StepperMask::of(axis) | StepperMask::of(DUAL_STEPPER),
            None => StepperMask::empty(),
        }
    }
}

impl Kinematics for Cartesian {
    fn name(&self) -> &'static str {
        "cartesian"
    }

    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError> {
        let mut steps = [0; STEPPER_COUNT];
        for i in 0..AXIS_COUNT {
            steps[i] = to_steps(position[i], self.steps_per_mm[i], i)?;
        }
        if let Some(axis) = self.dual_axis {
            steps[DUAL_STEPPER] =
                to_steps(position[axis], self.steps_per_mm[DUAL_STEPPER], DUAL_STEPPER)?;
        }
        Ok(steps)
    }

    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT] {
        let mut position = [0.0; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            position[i] = steps[i] as f32 / self.steps_per_mm[i];
        }
        position
    }

    fn home_sequence(&self) -> HomeSequence {
        let mut sequence = HomeSequence::new();
        for axis in HOME_ORDER {
            let mut steppers = StepperMask::of(axis);
            if self.dual_axis == Some(axis) {
                steppers |= StepperMask::of(DUAL_STEPPER);
            }
            // Capacity equals AXIS_COUNT; one pass per axis always fits.
            let _ = sequence.push(single_axis_step(axis, steppers, self.home_positive[axis]));
        }
        sequence
    }

    fn home_position(&self) -> [f32; AXIS_COUNT] {
        self.home
    }

    fn lock_axes(&self, limit_mask: StepperMask) -> StepperMask {
        limit_mask & self.dual_pair()
    }

    fn travel(&self) -> &Travel {
        &self.travel
    }
}
