//! Homing cycle supervisor.
//!
//! The supervisor does not watch inputs or drive the step clock. It turns
//! the geometry's [`HomeSequence`] into system-motion blocks and decides,
//! once per background pass, whether the current phase is over.
//!
//! ## Lifecycle
//!
//! 1. `Machine::home()` creates the cycle and sets `HOMING`
//! 2. Approach: move toward the switches at the seek rate. The limit handler
//!    locks dual-drive motors as their switch trips and stops the clock once
//!    every target switch has tripped
//! 3. Pull-off: back away by `pulloff` at the feed rate; the switches must
//!    release
//! 4. After the last pass the machine position becomes the home position
//!
//! ## Failures
//!
//! | Condition | Alarm |
//! |-----------|-------|
//! | Approach ends without every target switch | `HomingFailApproach` |
//! | A switch still closed after pull-off | `HomingFailPulloff` |
//! | Reset or door during the cycle | raised by the coordinator |

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::block::{BlockFlags, BlockRequest, StepperMask};
use evo_common::motion::state::AlarmCode;

use crate::config::{PathLimits, Settings, StepperLimits};
use crate::kinematics::{HomeSequence, HomingStep};

/// Search distance as a multiple of the axis travel.
pub const SEARCH_SCALE: f32 = 1.5;

// ─── Homing Phases ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Created, nothing queued yet.
    Idle,
    Approach,
    Pulloff,
    Complete,
    Failed,
}

/// A move the machine must queue for the current phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingMove {
    pub request: BlockRequest,
    /// Toward the switches; the limit handler ends it.
    pub approach: bool,
    /// Switches of this pass.
    pub limit_mask: StepperMask,
}

/// Result of a single supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingTick {
    InProgress,
    /// Discard any leftover motion and queue this move.
    Move(HomingMove),
    /// Every pass done; the caller sets the home position.
    Complete,
    Failed(AlarmCode),
}

/// What the machine observed since the last tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomingInputs {
    /// The limit handler saw every target switch and stopped the clock.
    pub limits_reached: bool,
    /// Nothing queued, nothing executing.
    pub motion_done: bool,
    /// Current limit inputs.
    pub limits: StepperMask,
}

// ─── Homing Cycle ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HomingCycle {
    sequence: HomeSequence,
    index: usize,
    phase: HomingPhase,
    steppers: [StepperLimits; STEPPER_COUNT],
    span: [f32; AXIS_COUNT],
    seek_rate: f32,
    feed_rate: f32,
    pulloff: f32,
}

impl HomingCycle {
    pub fn new(sequence: HomeSequence, settings: &Settings) -> Self {
        let mut span = [0.0; AXIS_COUNT];
        for (i, s) in span.iter_mut().enumerate() {
            *s = settings.span(i);
        }
        Self {
            sequence,
            index: 0,
            phase: HomingPhase::Idle,
            steppers: settings.steppers,
            span,
            seek_rate: settings.homing.seek_rate,
            feed_rate: settings.homing.feed_rate,
            pulloff: settings.homing.pulloff,
        }
    }

    #[inline]
    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Index of the pass in progress.
    #[inline]
    pub fn pass(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            HomingPhase::Idle | HomingPhase::Approach | HomingPhase::Pulloff
        )
    }

    /// Advance the cycle.
    pub fn tick(&mut self, inputs: &HomingInputs) -> HomingTick {
        match self.phase {
            HomingPhase::Idle => self.begin_pass(0),
            HomingPhase::Approach => {
                if inputs.limits_reached {
                    self.phase = HomingPhase::Pulloff;
                    HomingTick::Move(self.pass_move(&self.sequence[self.index], false))
                } else if inputs.motion_done {
                    self.fail(AlarmCode::HomingFailApproach)
                } else {
                    HomingTick::InProgress
                }
            }
            HomingPhase::Pulloff => {
                if !inputs.motion_done {
                    return HomingTick::InProgress;
                }
                let step = self.sequence[self.index];
                if inputs.limits.intersects(step.limit_mask) {
                    return self.fail(AlarmCode::HomingFailPulloff);
                }
                self.begin_pass(self.index + 1)
            }
            HomingPhase::Complete => HomingTick::Complete,
            HomingPhase::Failed => HomingTick::InProgress,
        }
    }

    fn begin_pass(&mut self, index: usize) -> HomingTick {
        self.index = index;
        match self.sequence.get(index) {
            Some(step) => {
                self.phase = HomingPhase::Approach;
                HomingTick::Move(self.pass_move(step, true))
            }
            None => {
                self.phase = HomingPhase::Complete;
                HomingTick::Complete
            }
        }
    }

    fn fail(&mut self, code: AlarmCode) -> HomingTick {
        self.phase = HomingPhase::Failed;
        HomingTick::Failed(code)
    }

    /// Longest travel among the axes of `step` times the search scale [mm].
    fn search_distance(&self, step: &HomingStep) -> f32 {
        let longest = (0..AXIS_COUNT)
            .filter(|&i| step.axes & (1 << i) != 0)
            .map(|i| self.span[i])
            .fold(0.0f32, f32::max);
        let longest = if longest > 0.0 {
            longest
        } else {
            self.span.iter().copied().fold(0.0f32, f32::max)
        };
        longest * SEARCH_SCALE
    }

    fn pass_move(&self, step: &HomingStep, approach: bool) -> HomingMove {
        let (distance, rate, sign) = if approach {
            (self.search_distance(step), self.seek_rate, 1)
        } else {
            (self.pulloff, self.feed_rate, -1)
        };

        let mut steps = [0i32; STEPPER_COUNT];
        for (i, s) in steps.iter_mut().enumerate() {
            let magnitude = (distance * self.steppers[i].steps_per_mm).round() as i32;
            *s = sign * i32::from(step.direction[i]) * magnitude;
        }

        let limits = PathLimits::along(&self.steppers, &steps);
        let path = steps
            .iter()
            .map(|&s| (s as f32) * (s as f32))
            .sum::<f32>()
            .sqrt();
        let feed = rate / 60.0 * path / distance;

        HomingMove {
            request: BlockRequest::linear(steps, feed, limits.max_rate, limits.acceleration)
                .with_flags(BlockFlags::SYSTEM_MOTION)
                .with_length(distance),
            approach,
            limit_mask: step.limit_mask,
        }
    }
}
