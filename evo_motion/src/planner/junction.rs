//! Junction (cornering) speed limit.
//!
//! The limit depends only on the angle between the two unit directions and
//! a dimensionless tolerance `factor` in [0, 1]:
//!
//! ```text
//! cos_j  = -(prev · next)
//! s      = sqrt((1 - cos_j) / 2)            // sin of half the junction angle
//! v_j²   = v_lim² · min(1, factor · s / (1 - s))
//! ```
//!
//! `v_lim` is the lower of the two nominal speeds. A straight continuation
//! (`s → 1`) runs at full speed, a reversal (`s = 0`) stops, and factor 0
//! stops at every direction change.

use evo_common::consts::STEPPER_COUNT;

/// `1 - s` below this counts as a straight continuation.
const STRAIGHT_EPS: f32 = 1e-6;

/// Cornering limit² [steps²/s²] between two consecutive moves.
pub fn junction_speed_sqr(
    prev_unit: &[f32; STEPPER_COUNT],
    unit: &[f32; STEPPER_COUNT],
    prev_nominal: f32,
    nominal: f32,
    factor: f32,
    minimum_sqr: f32,
) -> f32 {
    let limit = prev_nominal.min(nominal);
    let limit_sqr = limit * limit;

    let cos_j = -prev_unit
        .iter()
        .zip(unit)
        .map(|(a, b)| a * b)
        .sum::<f32>();
    let half_sin = (0.5 * (1.0 - cos_j)).max(0.0).sqrt();
    let gap = 1.0 - half_sin;

    let v_sqr = if gap < STRAIGHT_EPS {
        limit_sqr
    } else {
        limit_sqr * (factor * half_sin / gap).min(1.0)
    };
    v_sqr.max(minimum_sqr)
}
