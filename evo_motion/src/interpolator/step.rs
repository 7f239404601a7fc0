//! Step-clock callbacks.
//!
//! Runs at the highest priority. Bounded work per tick: one segment load at
//! most, one Bresenham increment per stepper, one output write. No
//! allocation, no logging, no planner access.
//!
//! # Bresenham with oversampling
//!
//! Block step counts are stored shifted left by `MAX_DSS_LEVEL`. At level
//! `L` each tick adds `steps >> L` to the stepper's accumulator and a tick
//! represents `1 / 2^L` of a dominant step, so every stepper receives the
//! same share of its total per unit of dominant travel at every level. The
//! accumulators start at half the event count and return there at the end
//! of the block.

use evo_common::consts::STEPPER_COUNT;
use evo_common::hal::{StepClock, StepperOutputs};
use evo_common::motion::block::StepperMask;

use super::Interpolator;
use super::segment::Segment;
use super::timing::StepTiming;

/// Step-callback state.
#[derive(Debug, Clone)]
pub(crate) struct StepState {
    /// Copy of the executing segment.
    pub segment: Segment,
    /// Ticks left in the executing segment (0: load the next one).
    pub ticks_left: u32,
    /// A stepper block is loaded into the accumulators.
    pub block_loaded: bool,
    pub st_block: u8,
    pub counter: [u32; STEPPER_COUNT],
    /// Emitted step position.
    pub position: [i32; STEPPER_COUNT],
    /// Steppers whose pulses are suppressed.
    pub locked: StepperMask,
    /// Accumulator offset from the start value when the last block ended.
    pub last_residue: [i64; STEPPER_COUNT],
}

impl StepState {
    pub(crate) fn new() -> Self {
        Self {
            segment: Segment {
                n_events: 0,
                timing: StepTiming {
                    ticks: u16::MAX,
                    prescaler: 1,
                },
                dss_level: 0,
                rate: 0.0,
                rate_delta: 0.0,
                mm_per_event: 0.0,
                st_block: 0,
                end_of_block: false,
            },
            ticks_left: 0,
            block_loaded: false,
            st_block: 0,
            counter: [0; STEPPER_COUNT],
            position: [0; STEPPER_COUNT],
            locked: StepperMask::empty(),
            last_residue: [0; STEPPER_COUNT],
        }
    }

    /// Forget the executing segment and block (position is kept).
    pub(crate) fn reset_block(&mut self) {
        self.ticks_left = 0;
        self.block_loaded = false;
    }
}

impl Interpolator {
    /// Step-assert callback: emit this tick's pulses.
    ///
    /// Loads the next segment when the current one is exhausted. With the
    /// queue empty the clock is stopped; a zero-length segment is dropped
    /// without a pulse.
    pub fn on_step_assert<H: StepClock + StepperOutputs + ?Sized>(&mut self, hal: &mut H) {
        if self.step.ticks_left == 0 {
            let Some(&segment) = self.segments.front() else {
                hal.stop();
                self.running = false;
                if self.prep.block_active && !self.prep.hold {
                    self.underruns = self.underruns.wrapping_add(1);
                }
                return;
            };

            if segment.n_events == 0 {
                self.segments.pop_front();
                if segment.end_of_block {
                    self.finish_block();
                }
                return;
            }

            if !self.step.block_loaded || segment.st_block != self.step.st_block {
                let block = &self.st_blocks[segment.st_block as usize];
                self.step.counter = [block.step_event_count >> 1; STEPPER_COUNT];
                self.step.st_block = segment.st_block;
                self.step.block_loaded = true;
                hal.set_directions(block.dir_bits);
            }
            self.step.segment = segment;
            self.step.ticks_left = segment.n_events;
            hal.reconfigure(segment.timing.ticks, segment.timing.prescaler);
        }

        let block = &self.st_blocks[self.step.st_block as usize];
        let level = self.step.segment.dss_level;
        let mut fire = StepperMask::empty();
        for i in 0..STEPPER_COUNT {
            let counter = &mut self.step.counter[i];
            *counter += block.steps[i] >> level;
            if *counter > block.step_event_count {
                *counter -= block.step_event_count;
                fire |= StepperMask::of(i);
            }
        }
        fire.remove(self.step.locked);

        if !fire.is_empty() {
            hal.step(fire);
            for (i, position) in self.step.position.iter_mut().enumerate() {
                if fire.has(i) {
                    *position += if block.dir_bits.has(i) { -1 } else { 1 };
                }
            }
        }

        self.step.ticks_left -= 1;
        if self.step.ticks_left == 0 {
            self.segments.pop_front();
            if self.step.segment.end_of_block {
                self.finish_block();
            }
        }
    }

    /// Step-reset callback: deassert step lines.
    #[inline]
    pub fn on_step_reset<H: StepperOutputs + ?Sized>(&mut self, hal: &mut H) {
        hal.clear_steps();
    }

    fn finish_block(&mut self) {
        if self.step.block_loaded {
            let block = &self.st_blocks[self.step.st_block as usize];
            let start = i64::from(block.step_event_count >> 1);
            for (residue, &counter) in self.step.last_residue.iter_mut().zip(&self.step.counter) {
                *residue = i64::from(counter) - start;
            }
        }
        self.step.block_loaded = false;
    }
}
