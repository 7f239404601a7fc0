//! Step interpolator: planner blocks to timed step pulses.
//!
//! # Contexts
//!
//! | Part | Context | Entry points |
//! |------|---------|--------------|
//! | Prep | background | [`Interpolator::prep_segment`], hold/resume |
//! | Commit | background, clock masked | [`Interpolator::commit`] |
//! | Step | step clock | [`Interpolator::on_step_assert`], [`Interpolator::on_step_reset`] |
//!
//! Prep slices the planner's executing block into [`Segment`]s and copies
//! the block's Bresenham data into a [`StepperBlock`] slot. The step
//! callbacks consume segments only, never the planner. Both sides share the
//! segment queue and the stepper block ring. Prep computes a segment
//! without touching either; only the commit that publishes it runs inside a
//! critical section.
//!
//! # Immediate stop
//!
//! [`Interpolator::stop`] stops the clock and drops every prepared segment.
//! The planner is left alone so that queued blocks can be resumed or
//! discarded by the caller.

pub mod prep;
pub mod segment;
pub mod step;
pub mod timing;

use evo_common::consts::{SEGMENT_BUFFER_SIZE, STEPPER_COUNT};
use evo_common::hal::{StepClock, StepperOutputs, ToolDriver};
use evo_common::motion::block::{StepperMask, ToolState};
use evo_common::motion::config::InterpolatorConfig;
use evo_common::motion::overrides::Overrides;
use heapless::Deque;
use static_assertions::const_assert;
use tracing::{debug, trace, warn};

use crate::planner::Planner;
pub use prep::{Prep, Ramp, Slice};
pub use segment::{Segment, StepperBlock};
use step::StepState;
pub use timing::{StepTiming, freq_to_clocks};

// Stepper block slots are addressed with a u8.
const_assert!(SEGMENT_BUFFER_SIZE <= u8::MAX as usize);

/// Output of one prep step, published by [`Interpolator::commit`].
#[derive(Debug, Clone, Copy)]
pub struct Prepared {
    /// Bresenham data for a newly loaded block and its slot.
    block: Option<(u8, StepperBlock)>,
    segment: Option<Segment>,
}

/// Segment producer and step-pulse generator.
#[derive(Debug, Clone)]
pub struct Interpolator {
    config: InterpolatorConfig,
    segments: Deque<Segment, SEGMENT_BUFFER_SIZE>,
    st_blocks: [StepperBlock; SEGMENT_BUFFER_SIZE],
    st_head: u8,
    prep: Prep,
    step: StepState,
    tool: ToolState,
    running: bool,
    underruns: u32,
}

impl Interpolator {
    pub fn new(config: &InterpolatorConfig) -> Self {
        Self {
            config: *config,
            segments: Deque::new(),
            st_blocks: [StepperBlock::EMPTY; SEGMENT_BUFFER_SIZE],
            st_head: 0,
            prep: Prep::new(config),
            step: StepState::new(),
            tool: ToolState::default(),
            running: false,
            underruns: 0,
        }
    }

    // ─── Prep (background) ──────────────────────────────────────────

    /// Fill the segment queue from the planner's executing block.
    ///
    /// Loads the next planner block when the previous one is fully sliced,
    /// applies its tool state, and releases it back to the planner once its
    /// last segment is queued. Stops early while a hold is parked.
    ///
    /// Publishes without masking; with the clock running use
    /// [`Interpolator::prep_segment`] and a masked [`Interpolator::commit`].
    pub fn prep_buffer<T: ToolDriver + ?Sized>(
        &mut self,
        planner: &mut Planner,
        overrides: &Overrides,
        tool: &mut T,
    ) {
        while let Some(prepared) = self.prep_segment(planner, overrides, tool) {
            self.commit(prepared);
        }
    }

    /// Prepare the next segment without touching anything the step
    /// callbacks read. Returns `None` once the queue is full, the planner
    /// is empty or a hold is parked.
    ///
    /// Only the queue length is read here; the step side can only shorten
    /// it, so a full queue stays full until the next call.
    pub fn prep_segment<T: ToolDriver + ?Sized>(
        &mut self,
        planner: &mut Planner,
        overrides: &Overrides,
        tool: &mut T,
    ) -> Option<Prepared> {
        if self.segments.is_full() || self.prep.hold_done {
            return None;
        }

        let mut published = None;
        let block = if self.prep.block_active {
            let changed = planner.take_exec_changed();
            let block = planner.current().copied()?;
            if changed && !self.prep.hold {
                self.prep.recompute = true;
            }
            block
        } else {
            let Some(block) = planner.current().copied() else {
                if self.prep.hold {
                    self.prep.finish_hold();
                }
                return None;
            };
            self.st_head = ((self.st_head as usize + 1) % SEGMENT_BUFFER_SIZE) as u8;
            published = Some((
                self.st_head,
                StepperBlock::new(block.id, &block.steps, block.step_event_count, block.dir_bits),
            ));
            self.prep.load_block(&block, self.st_head);
            planner.set_exec_entry_speed_sqr(self.prep.current_speed * self.prep.current_speed);
            planner.take_exec_changed();

            if block.tool != self.tool {
                tool.set_spindle(overrides.scale_spindle(block.tool.spindle));
                tool.set_coolant(overrides.apply_coolant(block.tool.coolant));
                self.tool = block.tool;
            }
            trace!(id = block.id, line = block.line, "Block loaded");
            block
        };

        if self.prep.recompute {
            let nominal = planner.effective_nominal_speed(&block);
            self.prep
                .compute_profile(&block, nominal, planner.exec_exit_speed_sqr());
        }

        let slice = self.prep.next_segment(&block);
        planner.set_exec_remaining(slice.remaining);
        planner.set_exec_entry_speed_sqr(slice.speed * slice.speed);
        if slice.block_done {
            planner.dequeue_consumed();
        }
        Some(Prepared {
            block: published,
            segment: slice.segment,
        })
    }

    /// Publish a prepared segment to the step side. Short and allocation
    /// free; this is the part that runs with the step clock masked.
    #[inline]
    pub fn commit(&mut self, prepared: Prepared) {
        if let Some((slot, block)) = prepared.block {
            self.st_blocks[slot as usize] = block;
        }
        if let Some(segment) = prepared.segment {
            if self.segments.push_back(segment).is_err() {
                warn!(slot = segment.st_block, "Segment queue full on commit");
            }
        }
    }

    /// Start decelerating to rest; see [`Interpolator::hold_parked`].
    pub fn request_hold(&mut self) {
        if !self.prep.hold {
            debug!(speed = self.prep.current_speed, "Feed hold: decelerating");
        }
        self.prep.begin_hold();
    }

    /// A hold is in effect (decelerating or parked).
    #[inline]
    pub fn is_holding(&self) -> bool {
        self.prep.hold
    }

    /// The hold reached rest and every prepared pulse has been emitted.
    #[inline]
    pub fn hold_parked(&self) -> bool {
        self.prep.hold && self.prep.hold_done && self.segments.is_empty() && !self.running
    }

    /// Leave a hold. The executing block restarts from rest.
    pub fn resume(&mut self, planner: &mut Planner) {
        planner.cycle_reinitialize();
        planner.take_exec_changed();
        self.prep.resume();
        debug!(queued = planner.len(), "Resuming from hold");
    }

    // ─── Clock Control ──────────────────────────────────────────────

    /// Start the step clock at the first queued segment's rate.
    ///
    /// Does nothing when already running or when no segment is ready.
    pub fn start<H: StepClock + StepperOutputs + ?Sized>(&mut self, hal: &mut H) -> bool {
        if self.running {
            return true;
        }
        let Some(first) = self.segments.front() else {
            return false;
        };
        hal.enable(true);
        hal.configure(first.timing.ticks, first.timing.prescaler);
        self.running = true;
        true
    }

    /// Immediate stop: halt the clock and drop every prepared segment.
    ///
    /// Queued planner blocks stay intact. Prepared-but-unexecuted distance of
    /// the executing block is lost, so the caller must resynchronize
    /// positions before planning again.
    pub fn stop<H: StepClock + StepperOutputs + ?Sized>(&mut self, hal: &mut H) {
        hal.stop();
        hal.clear_steps();
        self.running = false;
        self.segments.clear();
        self.step.reset_block();
        self.prep.reset();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Nothing left to emit: no block in prep, no segment, clock stopped.
    #[inline]
    pub fn is_idle(&self) -> bool {
        !self.running && self.segments.is_empty() && !self.prep.block_active
    }

    #[inline]
    pub fn segments_queued(&self) -> usize {
        self.segments.len()
    }

    /// Times the clock found the queue empty while a block was still in prep.
    #[inline]
    pub fn underruns(&self) -> u32 {
        self.underruns
    }

    // ─── Telemetry ──────────────────────────────────────────────────

    /// Step position as emitted to the drivers.
    #[inline]
    pub fn rt_position(&self) -> [i32; STEPPER_COUNT] {
        self.step.position
    }

    /// Overwrite the emitted step position (homing, probing, reset).
    pub fn sync_position(&mut self, steps: [i32; STEPPER_COUNT]) {
        self.step.position = steps;
    }

    /// Steppers whose pulses are suppressed (dual-drive squaring).
    pub fn set_locked(&mut self, mask: StepperMask) {
        self.step.locked = mask;
    }

    #[inline]
    pub fn locked(&self) -> StepperMask {
        self.step.locked
    }

    /// Feed of the executing segment [mm/min]; 0 when idle.
    pub fn realtime_feed(&self) -> f32 {
        if !self.running || self.step.ticks_left == 0 {
            return 0.0;
        }
        let segment = &self.step.segment;
        segment.feed_at(segment.n_events - self.step.ticks_left)
    }

    /// Tool state of the most recently loaded block.
    #[inline]
    pub fn tool(&self) -> ToolState {
        self.tool
    }

    /// Forget the applied tool state; the next block re-applies its own.
    pub fn clear_tool(&mut self) {
        self.tool = ToolState::default();
    }

    /// Bresenham accumulator offsets left by the last finished block.
    #[inline]
    pub fn last_block_residue(&self) -> [i64; STEPPER_COUNT] {
        self.step.last_residue
    }

    pub fn config(&self) -> &InterpolatorConfig {
        &self.config
    }
}
