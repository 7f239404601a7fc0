//! Data shared between prep (background) and the step callback.
//!
//! Prep fills both structures; the step callback only reads them. A
//! [`StepperBlock`] slot is reused only after every segment referring to it
//! has been consumed, which the ring size guarantees: the ring has one slot
//! per segment buffer entry and every block owns at least one segment.

use evo_common::consts::{MAX_DSS_LEVEL, STEPPER_COUNT};
use evo_common::motion::block::StepperMask;

use super::timing::StepTiming;
use crate::planner::BlockId;

/// Bresenham data for one planner block, pre-shifted for oversampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperBlock {
    pub id: BlockId,
    /// `|steps| << MAX_DSS_LEVEL` per stepper.
    pub steps: [u32; STEPPER_COUNT],
    /// `step_event_count << MAX_DSS_LEVEL`.
    pub step_event_count: u32,
    pub dir_bits: StepperMask,
}

impl StepperBlock {
    pub const EMPTY: Self = Self {
        id: 0,
        steps: [0; STEPPER_COUNT],
        step_event_count: 0,
        dir_bits: StepperMask::empty(),
    };

    pub fn new(id: BlockId, steps: &[u32; STEPPER_COUNT], event_count: u32, dir: StepperMask) -> Self {
        let mut shifted = [0u32; STEPPER_COUNT];
        for (dst, &s) in shifted.iter_mut().zip(steps) {
            *dst = s << MAX_DSS_LEVEL;
        }
        Self {
            id,
            steps: shifted,
            step_event_count: event_count << MAX_DSS_LEVEL,
            dir_bits: dir,
        }
    }
}

/// One fixed-time slice of a block's step stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Step-clock ticks in this segment (`dominant steps << dss_level`).
    pub n_events: u32,
    /// Timer period for each tick.
    pub timing: StepTiming,
    /// Oversampling level: each dominant step spans `1 << dss_level` ticks.
    pub dss_level: u8,
    /// Dominant step rate at segment start [steps/s].
    pub rate: f32,
    /// Dominant step rate change across the segment [steps/s].
    pub rate_delta: f32,
    /// Machine length per dominant step [mm], for feed reporting.
    pub mm_per_event: f32,
    /// Slot in the stepper block ring.
    pub st_block: u8,
    /// Last segment of its block.
    pub end_of_block: bool,
}

impl Segment {
    /// Dominant steps this segment emits.
    #[inline]
    pub const fn dominant_steps(&self) -> u32 {
        self.n_events >> self.dss_level
    }

    /// Interpolated feed [mm/min] after `done` of `n_events` ticks.
    pub fn feed_at(&self, done: u32) -> f32 {
        let fraction = if self.n_events == 0 {
            0.0
        } else {
            done as f32 / self.n_events as f32
        };
        (self.rate + self.rate_delta * fraction) * self.mm_per_event * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepper_block_is_preshifted() {
        let block = StepperBlock::new(7, &[10, 3, 0, 1], 10, StepperMask::S1);
        assert_eq!(block.steps[0], 10 << MAX_DSS_LEVEL);
        assert_eq!(block.steps[1], 3 << MAX_DSS_LEVEL);
        assert_eq!(block.step_event_count, 10 << MAX_DSS_LEVEL);
        assert_eq!(block.dir_bits, StepperMask::S1);
    }

    #[test]
    fn feed_interpolates_over_segment() {
        let segment = Segment {
            n_events: 40,
            timing: StepTiming { ticks: 100, prescaler: 1 },
            dss_level: 2,
            rate: 100.0,
            rate_delta: 20.0,
            mm_per_event: 0.0125,
            st_block: 0,
            end_of_block: false,
        };
        assert_eq!(segment.dominant_steps(), 10);
        assert!((segment.feed_at(0) - 75.0).abs() < 1e-3);
        assert!((segment.feed_at(20) - 82.5).abs() < 1e-3);
    }
}
