//! Look-ahead trajectory planner.
//!
//! A fixed ring of [`PlannerBlock`]s in stepper space. Every enqueue
//! computes the block's cornering limit against the previous block and
//! re-plans entry speeds so that the whole queue can always come to rest at
//! its end.
//!
//! # Re-planning
//!
//! | Pass     | Direction     | Constraint                                   |
//! |----------|---------------|----------------------------------------------|
//! | Reverse  | newest → tail | `entry ≤ next_entry + 2·a·d` (decelerate)    |
//! | Forward  | tail → newest | `next_entry ≤ entry + 2·a·d` (accelerate)    |
//!
//! Speeds are kept squared. `planned` marks the oldest block whose entry can
//! no longer improve; both passes stop there, so re-planning cost stays
//! proportional to the blocks that can still change.
//!
//! The executing block (the tail) is shared with the interpolator: it writes
//! the block's remaining distance and actual entry speed through
//! [`Planner::set_exec_remaining`] and [`Planner::set_exec_entry_speed_sqr`].

pub mod block;
pub mod junction;

use evo_common::consts::{MAX_BLOCK_STEPS, PLANNER_BUFFER_SIZE, STEPPER_COUNT};
use evo_common::motion::block::{BlockFlags, BlockRequest, StepperMask};
use evo_common::motion::config::PlannerConfig;
use tracing::{debug, trace};

pub use block::{BlockId, PlannerBlock};

use crate::error::EnqueueError;
use junction::junction_speed_sqr;

/// Occupancy and rejection counters for flow-control reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlannerCounters {
    pub queued: usize,
    pub free: usize,
    pub capacity: usize,
    /// Enqueues refused with `QueueFull` since start.
    pub rejected_full: u32,
    /// Re-plan passes run since start.
    pub replans: u32,
}

/// Bounded look-ahead block queue.
#[derive(Debug, Clone)]
pub struct Planner {
    blocks: [PlannerBlock; PLANNER_BUFFER_SIZE],
    tail: usize,
    head: usize,
    planned: usize,
    count: usize,

    /// Step position at the end of the newest queued block.
    position: [i32; STEPPER_COUNT],
    prev_unit: [f32; STEPPER_COUNT],
    prev_nominal: f32,

    junction_factor: f32,
    minimum_junction_speed_sqr: f32,

    feed_override: u8,
    rapid_override: u8,

    next_id: BlockId,
    exec_changed: bool,
    rejected_full: u32,
    replans: u32,
}

impl Planner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            blocks: [PlannerBlock::EMPTY; PLANNER_BUFFER_SIZE],
            tail: 0,
            head: 0,
            planned: 0,
            count: 0,
            position: [0; STEPPER_COUNT],
            prev_unit: [0.0; STEPPER_COUNT],
            prev_nominal: 0.0,
            junction_factor: config.junction_factor,
            minimum_junction_speed_sqr: config.minimum_junction_speed
                * config.minimum_junction_speed,
            feed_override: 100,
            rapid_override: 100,
            next_id: 0,
            exec_changed: false,
            rejected_full: 0,
            replans: 0,
        }
    }

    // ─── Ring Helpers ───────────────────────────────────────────────

    #[inline]
    const fn next_index(index: usize) -> usize {
        if index + 1 == PLANNER_BUFFER_SIZE { 0 } else { index + 1 }
    }

    #[inline]
    const fn prev_index(index: usize) -> usize {
        if index == 0 { PLANNER_BUFFER_SIZE - 1 } else { index - 1 }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.count == PLANNER_BUFFER_SIZE
    }

    /// Free slots (write availability for the caller's poll loop).
    #[inline]
    pub const fn free(&self) -> usize {
        PLANNER_BUFFER_SIZE - self.count
    }

    /// Step position at the end of the queued motion.
    #[inline]
    pub const fn position(&self) -> [i32; STEPPER_COUNT] {
        self.position
    }

    /// The executing block.
    #[inline]
    pub fn current(&self) -> Option<&PlannerBlock> {
        (self.count > 0).then(|| &self.blocks[self.tail])
    }

    /// Queued blocks oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PlannerBlock> + '_ {
        let mut index = self.tail;
        (0..self.count).map(move |_| {
            let block = &self.blocks[index];
            index = Self::next_index(index);
            block
        })
    }

    // ─── Enqueue ────────────────────────────────────────────────────

    /// Queue a stepper-space move and re-plan.
    ///
    /// Parameters are validated before capacity so that a malformed request
    /// is reported as such even when the queue is full.
    pub fn enqueue(&mut self, request: &BlockRequest) -> Result<BlockId, EnqueueError> {
        if request.steps.iter().all(|&s| s == 0) {
            return Err(EnqueueError::ZeroLength);
        }
        for (name, value) in [
            ("feed", request.feed),
            ("max_rate", request.max_rate),
            ("acceleration", request.acceleration),
        ] {
            if !value.is_finite() {
                return Err(EnqueueError::NonFinite(name));
            }
            if value <= 0.0 {
                return Err(EnqueueError::InvalidParameter(name));
            }
        }

        let mut abs_steps = [0u32; STEPPER_COUNT];
        let mut dir_bits = StepperMask::empty();
        for (i, &s) in request.steps.iter().enumerate() {
            abs_steps[i] = s.unsigned_abs();
            if s < 0 {
                dir_bits |= StepperMask::of(i);
            }
        }
        let step_event_count = abs_steps.iter().copied().max().unwrap_or(0);
        if step_event_count > MAX_BLOCK_STEPS {
            return Err(EnqueueError::BlockTooLong {
                steps: step_event_count,
            });
        }

        if self.is_full() {
            self.rejected_full = self.rejected_full.wrapping_add(1);
            return Err(EnqueueError::QueueFull);
        }

        let distance = abs_steps
            .iter()
            .map(|&s| (s as f32) * (s as f32))
            .sum::<f32>()
            .sqrt();
        let mut unit = [0.0f32; STEPPER_COUNT];
        for (u, &s) in unit.iter_mut().zip(&request.steps) {
            *u = s as f32 / distance;
        }

        let nominal_speed = if request.flags.contains(BlockFlags::RAPID) {
            request.max_rate
        } else {
            request.feed.min(request.max_rate)
        };

        let mut flags = request.flags;
        let max_junction_speed_sqr =
            if self.is_empty() || flags.contains(BlockFlags::SYSTEM_MOTION) {
                flags |= BlockFlags::FIRST_SINCE_STOP;
                0.0
            } else {
                junction_speed_sqr(
                    &self.prev_unit,
                    &unit,
                    self.prev_nominal,
                    nominal_speed,
                    self.junction_factor,
                    self.minimum_junction_speed_sqr,
                )
            };
        let max_entry_speed_sqr = max_junction_speed_sqr
            .min(nominal_speed * nominal_speed)
            .min(self.prev_nominal * self.prev_nominal);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let length_mm = if request.length_mm > 0.0 {
            request.length_mm
        } else {
            distance
        };

        self.blocks[self.head] = PlannerBlock {
            id,
            steps: abs_steps,
            dir_bits,
            step_event_count,
            distance,
            remaining: distance,
            unit,
            nominal_speed,
            max_rate: request.max_rate,
            acceleration: request.acceleration,
            entry_speed_sqr: 0.0,
            max_entry_speed_sqr,
            max_junction_speed_sqr,
            exit_speed_sqr: 0.0,
            mm_per_step: length_mm / distance,
            flags,
            tool: request.tool,
            line: request.line,
        };

        if self.is_empty() {
            self.planned = self.head;
        }
        self.head = Self::next_index(self.head);
        self.count += 1;

        for (p, &s) in self.position.iter_mut().zip(&request.steps) {
            *p = p.wrapping_add(s);
        }
        self.prev_unit = unit;
        self.prev_nominal = nominal_speed;

        self.recalculate();
        trace!(
            id,
            steps = step_event_count,
            nominal = nominal_speed,
            junction_sqr = max_junction_speed_sqr,
            queued = self.count,
            "Block queued"
        );
        Ok(id)
    }

    // ─── Re-planning ────────────────────────────────────────────────

    fn recalculate(&mut self) {
        self.replans = self.replans.wrapping_add(1);
        let before = self.exec_exit_speed_sqr();

        self.reverse_pass();
        self.forward_pass();
        self.sync_exit_speeds();

        if self.exec_exit_speed_sqr() != before {
            self.exec_changed = true;
        }
    }

    fn reverse_pass(&mut self) {
        if self.count == 0 {
            return;
        }
        let newest = Self::prev_index(self.head);
        if newest == self.planned {
            return;
        }

        let last = &mut self.blocks[newest];
        last.entry_speed_sqr = last
            .max_entry_speed_sqr
            .min(2.0 * last.acceleration * last.remaining);
        let mut next_entry = last.entry_speed_sqr;

        let mut index = Self::prev_index(newest);
        while index != self.planned {
            let block = &mut self.blocks[index];
            if block.entry_speed_sqr != block.max_entry_speed_sqr {
                block.entry_speed_sqr = block
                    .max_entry_speed_sqr
                    .min(next_entry + 2.0 * block.acceleration * block.remaining);
            }
            next_entry = block.entry_speed_sqr;
            index = Self::prev_index(index);
        }
    }

    fn forward_pass(&mut self) {
        if self.count < 2 {
            return;
        }
        let mut index = self.planned;
        let mut next = Self::next_index(index);
        while next != self.head {
            let current = self.blocks[index];
            let following = &mut self.blocks[next];

            if current.entry_speed_sqr < following.entry_speed_sqr {
                let reachable =
                    current.entry_speed_sqr + 2.0 * current.acceleration * current.remaining;
                if reachable < following.entry_speed_sqr {
                    following.entry_speed_sqr = reachable;
                    self.planned = next;
                }
            }
            if following.entry_speed_sqr == following.max_entry_speed_sqr {
                self.planned = next;
            }

            index = next;
            next = Self::next_index(next);
        }
    }

    fn sync_exit_speeds(&mut self) {
        let mut index = self.tail;
        for i in 0..self.count {
            let next = Self::next_index(index);
            self.blocks[index].exit_speed_sqr = if i + 1 < self.count {
                self.blocks[next].entry_speed_sqr
            } else {
                0.0
            };
            index = next;
        }
    }

    // ─── Executing Block ────────────────────────────────────────────

    /// Planned exit speed² of the executing block.
    #[inline]
    pub fn exec_exit_speed_sqr(&self) -> f32 {
        if self.count >= 2 {
            self.blocks[Self::next_index(self.tail)].entry_speed_sqr
        } else {
            0.0
        }
    }

    /// Record the remaining length of the executing block.
    pub fn set_exec_remaining(&mut self, remaining: f32) {
        if self.count > 0 {
            self.blocks[self.tail].remaining = remaining.max(0.0);
        }
    }

    /// Record the speed² the executing block is running at.
    ///
    /// A feed override above 100 % lets the interpolator run faster than
    /// planned; the stored value is capped at the block's nominal speed so
    /// the planned profile never exceeds it.
    pub fn set_exec_entry_speed_sqr(&mut self, speed_sqr: f32) {
        if self.count > 0 {
            let block = &mut self.blocks[self.tail];
            block.entry_speed_sqr = speed_sqr.min(block.nominal_speed * block.nominal_speed);
        }
    }

    /// Whether re-planning changed the executing block's exit since the
    /// last call (the interpolator then re-profiles).
    #[inline]
    pub fn take_exec_changed(&mut self) -> bool {
        std::mem::take(&mut self.exec_changed)
    }

    /// Release the executing block once the interpolator has finished it.
    ///
    /// Frees the slot and lets the following blocks pick up any headroom
    /// the freed block leaves.
    pub fn dequeue_consumed(&mut self) -> Option<BlockId> {
        if self.count == 0 {
            return None;
        }
        let id = self.blocks[self.tail].id;
        if self.planned == self.tail {
            self.planned = Self::next_index(self.tail);
        }
        self.tail = Self::next_index(self.tail);
        self.count -= 1;
        if self.count == 0 {
            self.planned = self.tail;
        }
        self.forward_pass();
        self.sync_exit_speeds();
        Some(id)
    }

    /// Restart planning from rest at the executing block (after a hold).
    pub fn cycle_reinitialize(&mut self) {
        if self.count == 0 {
            return;
        }
        self.blocks[self.tail].entry_speed_sqr = 0.0;
        self.planned = self.tail;
        self.recalculate();
        debug!(queued = self.count, "Planner re-initialized from rest");
    }

    /// Drop every queued block; the position stays at the queued end.
    pub fn flush(&mut self) {
        if self.count > 0 {
            debug!(dropped = self.count, "Planner flushed");
        }
        self.tail = 0;
        self.head = 0;
        self.planned = 0;
        self.count = 0;
        self.exec_changed = false;
    }

    /// Set the queued-end position (after homing, probing or an abort).
    pub fn sync_position(&mut self, steps: [i32; STEPPER_COUNT]) {
        self.position = steps;
    }

    // ─── Overrides ──────────────────────────────────────────────────

    /// Feed override percentage for the interpolator's cruise target.
    pub fn apply_feed_override(&mut self, pct: u8) {
        if pct != self.feed_override {
            self.feed_override = pct;
            self.exec_changed = true;
        }
    }

    /// Rapid override percentage for rapid blocks.
    pub fn apply_rapid_override(&mut self, pct: u8) {
        if pct != self.rapid_override {
            self.rapid_override = pct;
            self.exec_changed = true;
        }
    }

    /// Cruise speed the interpolator targets for `block` [steps/s].
    ///
    /// Planned entry and exit speeds stay untouched; they bound the profile
    /// regardless of the override.
    pub fn effective_nominal_speed(&self, block: &PlannerBlock) -> f32 {
        let pct = if block.flags.contains(BlockFlags::SYSTEM_MOTION)
            || block.flags.contains(BlockFlags::NO_FEED_OVERRIDE)
        {
            100
        } else if block.flags.contains(BlockFlags::RAPID) {
            self.rapid_override
        } else {
            self.feed_override
        };
        (block.nominal_speed * f32::from(pct) / 100.0).min(block.max_rate)
    }

    // ─── Diagnostics ────────────────────────────────────────────────

    pub fn overflow_counters(&self) -> PlannerCounters {
        PlannerCounters {
            queued: self.count,
            free: self.free(),
            capacity: PLANNER_BUFFER_SIZE,
            rejected_full: self.rejected_full,
            replans: self.replans,
        }
    }
}
