//! CoreXY belt gantry.
//!
//! Motors A and B share the XY carriage through crossed belts:
//! `A = X + Y`, `B = X - Y`. Z is a plain linear axis on stepper 2.
//! Limit inputs are wired per machine axis (bit 0 = X switch, bit 1 = Y).

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::{HOME_ORDER, HomeSequence, HomingStep, Kinematics, Travel, to_steps};
use crate::config::Settings;
use crate::error::KinematicsError;

#[derive(Debug, Clone)]
pub struct CoreXy {
    steps_per_mm: [f32; STEPPER_COUNT],
    travel: Travel,
    home: [f32; AXIS_COUNT],
    home_positive: [bool; AXIS_COUNT],
}

impl CoreXy {
    pub fn new(settings: &Settings) -> Self {
        let travel = Travel::from_settings(settings);
        let mut home = [0.0; AXIS_COUNT];
        let mut home_positive = [false; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            home_positive[i] = settings.homing.homes_positive(i);
            home[i] = travel.home_end(i, home_positive[i]);
        }
        Self {
            steps_per_mm: settings.steppers.map(|s| s.steps_per_mm),
            travel,
            home,
            home_positive,
        }
    }
}

impl Kinematics for CoreXy {
    fn name(&self) -> &'static str {
        "corexy"
    }

    fn inverse(
        &self,
        position: &[f32; AXIS_COUNT],
    ) -> Result<[i32; STEPPER_COUNT], KinematicsError> {
        let [x, y, z] = *position;
        let mut steps = [0; STEPPER_COUNT];
        steps[0] = to_steps(x + y, self.steps_per_mm[0], 0)?;
        steps[1] = to_steps(x - y, self.steps_per_mm[1], 1)?;
        steps[2] = to_steps(z, self.steps_per_mm[2], 2)?;
        Ok(steps)
    }

    fn forward(&self, steps: &[i32; STEPPER_COUNT]) -> [f32; AXIS_COUNT] {
        let a = steps[0] as f32 / self.steps_per_mm[0];
        let b = steps[1] as f32 / self.steps_per_mm[1];
        [
            0.5 * (a + b),
            0.5 * (a - b),
            steps[2] as f32 / self.steps_per_mm[2],
        ]
    }

    fn home_sequence(&self) -> HomeSequence {
        let mut sequence = HomeSequence::new();
        for axis in HOME_ORDER {
            let sign: i8 = if self.home_positive[axis] { 1 } else { -1 };
            let mut direction = [0i8; STEPPER_COUNT];
            match axis {
                0 => {
                    direction[0] = sign;
                    direction[1] = sign;
                }
                1 => {
                    direction[0] = sign;
                    direction[1] = -sign;
                }
                _ => direction[axis] = sign,
            }
            let _ = sequence.push(HomingStep {
                axes: 1 << axis,
                limit_mask: StepperMask::of(axis),
                direction,
            });
        }
        sequence
    }

    fn home_position(&self) -> [f32; AXIS_COUNT] {
        self.home
    }

    fn travel(&self) -> &Travel {
        &self.travel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TEST_MACHINE;

    fn kin() -> CoreXy {
        let text = format!("{TEST_MACHINE}\n[kinematics]\ntype = \"corexy\"\n");
        CoreXy::new(&Settings::from_toml(&text).unwrap())
    }

    #[test]
    fn pure_x_moves_both_motors_equally() {
        let steps = kin().inverse(&[10.0, 0.0, 0.0]).unwrap();
        assert_eq!(steps[0], 800);
        assert_eq!(steps[1], 800);
    }

    #[test]
    fn pure_y_moves_motors_opposite() {
        let steps = kin().inverse(&[0.0, 10.0, 0.0]).unwrap();
        assert_eq!(steps[0], 800);
        assert_eq!(steps[1], -800);
    }

    #[test]
    fn forward_inverts_inverse() {
        let k = kin();
        let p = [12.3, -45.6, -7.8];
        let back = k.forward(&k.inverse(&p).unwrap());
        for i in 0..AXIS_COUNT {
            assert!((back[i] - p[i]).abs() < 0.01, "axis {i}: {back:?}");
        }
    }

    #[test]
    fn y_homing_drives_motors_apart() {
        let seq = kin().home_sequence();
        assert_eq!(seq.len(), 3);
        // Default directions home toward the negative end.
        assert_eq!(seq[2].axes, 0b010);
        assert_eq!(seq[2].direction, [-1, 1, 0, 0]);
        assert_eq!(seq[1].direction, [-1, -1, 0, 0]);
        assert!(kin().lock_axes(StepperMask::S0).is_empty());
    }
}
