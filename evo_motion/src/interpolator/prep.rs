//! Segment preparation: velocity profile and time slicing.
//!
//! Prep owns the speed state of the executing block. For each block it
//! computes a profile from the speed the machine actually has, then cuts
//! the profile into fixed-time slices. Each slice is walked through the
//! ramps it crosses:
//!
//! ```text
//!  speed
//!    │      ┌──────── cruise ────────┐
//!    │     ╱                          ╲
//!    │    ╱ accel                decel ╲
//!    │   ╱                              ╲  exit
//!    └──┴──────────────────────────────────┴── distance remaining → 0
//!       accelerate_until ▲      ▲ decelerate_after
//! ```
//!
//! Ramp marks are distances *remaining* in the block. A slice that covers
//! less than [`MIN_STEPS_PER_SEGMENT`] dominant steps is extended by whole
//! segment periods so slow moves still produce pulses.
//!
//! Dominant step counts are tracked as integers: the step count of a slice is
//! the drop in `ceil(steps remaining)`, which sums to the block's exact
//! step count however the float distances round.

use evo_common::consts::MAX_DSS_LEVEL;
use evo_common::motion::config::InterpolatorConfig;

use super::segment::Segment;
use super::timing::{clamp_rate, dss_level, freq_to_clocks};
use crate::planner::PlannerBlock;

/// Minimum dominant steps a slice must cover before it is closed.
pub const MIN_STEPS_PER_SEGMENT: f32 = 1.25;

/// Profile phase at the prep cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    Accel,
    Cruise,
    Decel,
    /// Entered above cruise speed (override lowered): slow down to cruise.
    DecelOverride,
}

/// Result of slicing one segment off the executing block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    /// Segment to queue; `None` when the slice emits no step.
    pub segment: Option<Segment>,
    /// Block distance left after this slice.
    pub remaining: f32,
    /// Speed at the end of the slice.
    pub speed: f32,
    /// The block is fully converted.
    pub block_done: bool,
}

/// Prep-side speed and slicing state.
#[derive(Debug, Clone)]
pub struct Prep {
    clock_hz: u32,
    segment_time: f32,
    f_step_min: f32,
    f_step_max: f32,
    dss_cutoff: f32,
    dss_max_level: u8,

    /// A planner block is loaded.
    pub block_active: bool,
    pub st_index: u8,
    step_per_distance: f32,
    mm_per_event: f32,
    req_distance: f32,
    last_n_steps: u32,
    dt_remainder: f32,

    pub ramp: Ramp,
    pub current_speed: f32,
    pub maximum_speed: f32,
    pub exit_speed: f32,
    pub accelerate_until: f32,
    pub decelerate_after: f32,
    /// Distance mark where the slicing stops (0, or the hold stop point).
    pub distance_complete: f32,
    /// Profile must be recomputed before the next slice.
    pub recompute: bool,
    dss_level: u8,

    /// Forced deceleration to rest is in effect.
    pub hold: bool,
    /// The hold reached rest; no more slices until resumed.
    pub hold_done: bool,
}

impl Prep {
    pub fn new(config: &InterpolatorConfig) -> Self {
        Self {
            clock_hz: config.step_clock_hz,
            segment_time: 1.0 / config.segment_rate_hz as f32,
            f_step_min: config.f_step_min,
            f_step_max: config.f_step_max,
            dss_cutoff: config.dss_cutoff_freq,
            dss_max_level: config.dss_max_oversampling.min(MAX_DSS_LEVEL),
            block_active: false,
            st_index: 0,
            step_per_distance: 0.0,
            mm_per_event: 0.0,
            req_distance: 0.0,
            last_n_steps: 0,
            dt_remainder: 0.0,
            ramp: Ramp::Accel,
            current_speed: 0.0,
            maximum_speed: 0.0,
            exit_speed: 0.0,
            accelerate_until: 0.0,
            decelerate_after: 0.0,
            distance_complete: 0.0,
            recompute: false,
            dss_level: 0,
            hold: false,
            hold_done: false,
        }
    }

    /// Drop all motion state (immediate stop).
    pub fn reset(&mut self) {
        self.block_active = false;
        self.current_speed = 0.0;
        self.dt_remainder = 0.0;
        self.recompute = false;
        self.hold = false;
        self.hold_done = false;
        self.dss_level = 0;
    }

    /// Start slicing `block`, entering at the current speed.
    pub fn load_block(&mut self, block: &PlannerBlock, st_index: u8) {
        self.block_active = true;
        self.st_index = st_index;
        self.step_per_distance = block.steps_per_distance();
        self.mm_per_event = block.mm_per_step / self.step_per_distance;
        self.req_distance = MIN_STEPS_PER_SEGMENT / self.step_per_distance;
        self.last_n_steps = block.step_event_count;
        self.dt_remainder = 0.0;
        self.recompute = true;
    }

    /// Enter a feed hold: decelerate to rest from wherever the profile is.
    pub fn begin_hold(&mut self) {
        if !self.hold {
            self.hold = true;
            self.recompute = true;
        }
        if !self.block_active {
            self.finish_hold();
        }
    }

    pub(crate) fn finish_hold(&mut self) {
        self.hold_done = true;
        self.current_speed = 0.0;
    }

    /// Leave the hold; the next profile starts from rest.
    pub fn resume(&mut self) {
        self.hold = false;
        self.hold_done = false;
        self.current_speed = 0.0;
        self.recompute = true;
    }

    // ─── Profile ────────────────────────────────────────────────────

    /// Compute the profile of the executing block from the current speed.
    ///
    /// `nominal` is the override-adjusted cruise speed; `planned_exit_sqr`
    /// the planner's exit speed² for the block.
    pub fn compute_profile(&mut self, block: &PlannerBlock, nominal: f32, planned_exit_sqr: f32) {
        self.recompute = false;
        let remaining = block.remaining;
        let accel = block.acceleration;
        let inv_2_accel = 0.5 / accel;
        let entry_sqr = self.current_speed * self.current_speed;
        self.distance_complete = 0.0;

        if self.hold {
            self.ramp = Ramp::Decel;
            self.decelerate_after = remaining;
            self.maximum_speed = self.current_speed;
            let stop_at = remaining - entry_sqr * inv_2_accel;
            if stop_at > 0.0 {
                self.distance_complete = stop_at;
                self.exit_speed = 0.0;
            } else {
                // Rest is reached in a later block.
                self.exit_speed = (entry_sqr - 2.0 * accel * remaining).max(0.0).sqrt();
            }
            return;
        }

        let nominal_sqr = nominal * nominal;
        let exit_sqr = if block.is_system_motion() {
            0.0
        } else {
            planned_exit_sqr.min(nominal_sqr)
        };
        self.exit_speed = exit_sqr.sqrt();
        self.ramp = Ramp::Accel;
        self.accelerate_until = remaining;
        self.decelerate_after = 0.0;

        let intersect = 0.5 * (remaining + inv_2_accel * (entry_sqr - exit_sqr));
        if entry_sqr > nominal_sqr {
            self.accelerate_until = remaining - inv_2_accel * (entry_sqr - nominal_sqr);
            let decelerate_after = inv_2_accel * (nominal_sqr - exit_sqr);
            if self.accelerate_until <= decelerate_after {
                // No room to reach cruise: brake through the whole block.
                self.ramp = Ramp::Decel;
                self.decelerate_after = remaining;
                self.maximum_speed = self.current_speed;
                self.exit_speed = (entry_sqr - 2.0 * accel * remaining).max(exit_sqr).sqrt();
            } else {
                self.ramp = Ramp::DecelOverride;
                self.decelerate_after = decelerate_after;
                self.maximum_speed = nominal;
            }
        } else if intersect > 0.0 {
            if intersect < remaining {
                self.decelerate_after = inv_2_accel * (nominal_sqr - exit_sqr);
                if self.decelerate_after < intersect {
                    // Trapezoid.
                    self.maximum_speed = nominal;
                    if entry_sqr == nominal_sqr {
                        self.ramp = Ramp::Cruise;
                    } else {
                        self.accelerate_until -= inv_2_accel * (nominal_sqr - entry_sqr);
                    }
                } else {
                    // Triangle.
                    self.accelerate_until = intersect;
                    self.decelerate_after = intersect;
                    self.maximum_speed = (2.0 * accel * intersect + exit_sqr).sqrt();
                }
            } else {
                self.ramp = Ramp::Decel;
                self.decelerate_after = remaining;
                self.maximum_speed = self.current_speed;
            }
        } else {
            // Acceleration only.
            self.accelerate_until = 0.0;
            self.maximum_speed = self.exit_speed;
        }
    }

    // ─── Slicing ────────────────────────────────────────────────────

    /// Slice the next segment off `block`.
    pub fn next_segment(&mut self, block: &PlannerBlock) -> Slice {
        let accel = block.acceleration;
        let start_speed = self.current_speed;
        let mut remaining = block.remaining;
        let minimum = (remaining - self.req_distance).max(0.0);

        let mut dt_max = self.segment_time;
        let mut dt = 0.0f32;
        let mut time_var = dt_max;

        loop {
            let iter_start = remaining;
            match self.ramp {
                Ramp::DecelOverride => {
                    let dv = accel * time_var;
                    let travel = time_var * (self.current_speed - 0.5 * dv);
                    remaining -= travel;
                    if remaining < self.accelerate_until || travel <= 0.0 {
                        remaining = self.accelerate_until;
                        time_var = 2.0 * (iter_start - remaining)
                            / (self.current_speed + self.maximum_speed).max(f32::EPSILON);
                        self.ramp = Ramp::Cruise;
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed -= dv;
                    }
                }
                Ramp::Accel => {
                    let dv = accel * time_var;
                    remaining -= time_var * (self.current_speed + 0.5 * dv);
                    if remaining < self.accelerate_until {
                        remaining = self.accelerate_until;
                        time_var = 2.0 * (iter_start - remaining)
                            / (self.current_speed + self.maximum_speed).max(f32::EPSILON);
                        self.ramp = if remaining == self.decelerate_after {
                            Ramp::Decel
                        } else {
                            Ramp::Cruise
                        };
                        self.current_speed = self.maximum_speed;
                    } else {
                        self.current_speed += dv;
                    }
                }
                Ramp::Cruise => {
                    let next = remaining - self.maximum_speed * time_var;
                    if next < self.decelerate_after {
                        time_var = ((remaining - self.decelerate_after) / self.maximum_speed).max(0.0);
                        remaining = self.decelerate_after.min(remaining);
                        self.ramp = Ramp::Decel;
                    } else {
                        remaining = next;
                    }
                }
                Ramp::Decel => {
                    let dv = accel * time_var;
                    let mut reached_end = true;
                    if self.current_speed > dv {
                        let next = remaining - time_var * (self.current_speed - 0.5 * dv);
                        if next > self.distance_complete {
                            remaining = next;
                            self.current_speed -= dv;
                            reached_end = false;
                        }
                    }
                    if reached_end {
                        time_var = 2.0 * (remaining - self.distance_complete)
                            / (self.current_speed + self.exit_speed).max(f32::EPSILON);
                        remaining = self.distance_complete;
                        self.current_speed = self.exit_speed;
                    }
                }
            }

            dt += time_var;
            if remaining <= self.distance_complete {
                break;
            }
            if dt < dt_max {
                time_var = dt_max - dt;
            } else if remaining > minimum {
                dt_max += self.segment_time;
                time_var = dt_max - dt;
            } else {
                break;
            }
        }

        let at_mark = remaining <= self.distance_complete;
        let block_done = at_mark && self.distance_complete <= 0.0;
        let hold_stop = at_mark && !block_done;

        let steps_remaining = if block_done {
            0.0
        } else {
            (remaining * self.step_per_distance).max(0.0)
        };
        let n_remaining = if block_done {
            0
        } else {
            (steps_remaining.ceil() as u32).min(self.last_n_steps)
        };
        let n_step = self.last_n_steps - n_remaining;

        if n_step == 0 && !block_done {
            if self.hold {
                // Less than a step left before rest: park here.
                self.finish_hold();
                return Slice {
                    segment: None,
                    remaining: block.remaining,
                    speed: 0.0,
                    block_done: false,
                };
            }
            self.dt_remainder += dt;
            return Slice {
                segment: None,
                remaining,
                speed: self.current_speed,
                block_done: false,
            };
        }

        let segment = if n_step == 0 {
            Segment {
                n_events: 0,
                timing: freq_to_clocks(self.clock_hz, self.f_step_max),
                dss_level: 0,
                rate: 0.0,
                rate_delta: 0.0,
                mm_per_event: self.mm_per_event,
                st_block: self.st_index,
                end_of_block: true,
            }
        } else {
            let dt_total = dt + self.dt_remainder;
            let inv_rate = dt_total / (self.last_n_steps as f32 - steps_remaining);
            self.dt_remainder = (n_remaining as f32 - steps_remaining) * inv_rate;

            let rate = clamp_rate(1.0 / inv_rate, self.f_step_min, self.f_step_max);
            self.dss_level = dss_level(rate, self.dss_level, self.dss_cutoff, self.dss_max_level);
            let tick_rate = rate * f32::from(1u16 << self.dss_level);

            Segment {
                n_events: n_step << self.dss_level,
                timing: freq_to_clocks(self.clock_hz, tick_rate),
                dss_level: self.dss_level,
                rate: start_speed * self.step_per_distance,
                rate_delta: (self.current_speed - start_speed) * self.step_per_distance,
                mm_per_event: self.mm_per_event,
                st_block: self.st_index,
                end_of_block: block_done,
            }
        };
        self.last_n_steps = n_remaining;

        if block_done {
            self.block_active = false;
        } else if hold_stop {
            self.finish_hold();
        }

        Slice {
            segment: Some(segment),
            remaining,
            speed: self.current_speed,
            block_done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evo_common::motion::block::{BlockRequest, StepperMask};
    use evo_common::motion::config::PlannerConfig;

    use crate::planner::Planner;

    fn config() -> InterpolatorConfig {
        InterpolatorConfig::default()
    }

    fn single_block(steps: i32, speed: f32, accel: f32) -> PlannerBlock {
        let mut planner = Planner::new(&PlannerConfig::default());
        planner
            .enqueue(&BlockRequest::linear([steps, 0, 0, 0], speed, speed * 2.0, accel))
            .unwrap();
        *planner.current().unwrap()
    }

    /// Slice a whole block, returning total dominant steps, elapsed time and peak speed.
    fn run_block(prep: &mut Prep, mut block: PlannerBlock, nominal: f32) -> (u32, f32, f32) {
        prep.load_block(&block, 0);
        prep.compute_profile(&block, nominal, 0.0);
        let mut steps = 0;
        let mut time = 0.0;
        let mut peak = 0.0f32;
        for _ in 0..100_000 {
            let slice = prep.next_segment(&block);
            if let Some(segment) = slice.segment {
                steps += segment.dominant_steps();
                time += segment.n_events as f32 * segment.timing.period(prep.clock_hz);
            }
            peak = peak.max(slice.speed);
            block.remaining = slice.remaining;
            if slice.block_done || prep.hold_done {
                return (steps, time, peak);
            }
        }
        panic!("block never completed");
    }

    #[test]
    fn triangle_profile_conserves_steps() {
        let block = single_block(1000, 500.0, 100.0);
        let mut prep = Prep::new(&config());
        prep.compute_profile(&block, 500.0, 0.0);
        // Cannot reach 500 steps/s within 1000 steps at 100 steps/s².
        assert_eq!(prep.ramp, Ramp::Accel);
        assert!((prep.maximum_speed - 316.23).abs() < 0.1);
        assert!((prep.accelerate_until - 500.0).abs() < 1e-3);

        let (steps, time, peak) = run_block(&mut prep, block, 500.0);
        assert_eq!(steps, 1000);
        assert!(peak <= 316.3);
        // 2 · sqrt(2 · 500 / 100) ≈ 6.32 s
        assert!((time - 6.32).abs() < 0.15, "took {time}");
        assert_eq!(prep.current_speed, 0.0);
        assert!(!prep.block_active);
    }

    #[test]
    fn trapezoid_reaches_cruise() {
        let block = single_block(4000, 300.0, 200.0);
        let mut prep = Prep::new(&config());
        prep.compute_profile(&block, 300.0, 0.0);
        assert_eq!(prep.maximum_speed, 300.0);
        // 300² / (2 · 200) = 225 steps to accelerate and to decelerate.
        assert!((prep.accelerate_until - 3775.0).abs() < 1e-2);
        assert!((prep.decelerate_after - 225.0).abs() < 1e-2);

        let (steps, time, peak) = run_block(&mut prep, block, 300.0);
        assert_eq!(steps, 4000);
        assert!((peak - 300.0).abs() < 1e-3);
        // 1.5 s ramps each side + 3550 / 300 s cruise.
        let expected = 3.0 + 3550.0 / 300.0;
        assert!((time - expected).abs() / expected < 0.02, "took {time}");
    }

    #[test]
    fn entering_above_cruise_decelerates_to_it() {
        let block = single_block(4000, 400.0, 200.0);
        let mut prep = Prep::new(&config());
        prep.current_speed = 400.0;
        prep.compute_profile(&block, 200.0, 0.0);
        assert_eq!(prep.ramp, Ramp::DecelOverride);
        assert_eq!(prep.maximum_speed, 200.0);

        prep.load_block(&block, 0);
        let (steps, _, _) = run_block_from_current(&mut prep, block, 200.0);
        assert_eq!(steps, 4000);
    }

    fn run_block_from_current(prep: &mut Prep, mut block: PlannerBlock, nominal: f32) -> (u32, f32, f32) {
        prep.compute_profile(&block, nominal, 0.0);
        let mut steps = 0;
        let mut peak = 0.0f32;
        while prep.block_active {
            let slice = prep.next_segment(&block);
            if let Some(segment) = slice.segment {
                steps += segment.dominant_steps();
            }
            peak = peak.max(slice.speed);
            block.remaining = slice.remaining;
        }
        (steps, 0.0, peak)
    }

    #[test]
    fn hold_stops_inside_block_and_resumes() {
        let mut block = single_block(5000, 400.0, 200.0);
        let mut prep = Prep::new(&config());
        prep.load_block(&block, 0);
        prep.compute_profile(&block, 400.0, 0.0);

        let mut steps = 0;
        for _ in 0..80 {
            let slice = prep.next_segment(&block);
            steps += slice.segment.map_or(0, |s| s.dominant_steps());
            block.remaining = slice.remaining;
        }
        assert!(prep.current_speed > 0.0);

        prep.begin_hold();
        while !prep.hold_done {
            if prep.recompute {
                prep.compute_profile(&block, 400.0, 0.0);
            }
            let slice = prep.next_segment(&block);
            steps += slice.segment.map_or(0, |s| s.dominant_steps());
            block.remaining = slice.remaining;
            assert!(!slice.block_done);
        }
        assert_eq!(prep.current_speed, 0.0);
        assert!(prep.block_active);
        assert!(steps < 5000);

        prep.resume();
        prep.compute_profile(&block, 400.0, 0.0);
        while prep.block_active {
            let slice = prep.next_segment(&block);
            steps += slice.segment.map_or(0, |s| s.dominant_steps());
            block.remaining = slice.remaining;
        }
        assert_eq!(steps, 5000);
    }

    #[test]
    fn hold_without_block_completes_at_once() {
        let mut prep = Prep::new(&config());
        prep.begin_hold();
        assert!(prep.hold_done);
        prep.resume();
        assert!(!prep.hold && !prep.hold_done);
    }

    #[test]
    fn slow_moves_still_step() {
        // 5 steps/s: each slice must stretch past one segment period.
        let block = single_block(6, 5.0, 50.0);
        let mut prep = Prep::new(&config());
        let (steps, time, _) = run_block(&mut prep, block, 5.0);
        assert_eq!(steps, 6);
        assert!(time > 1.0, "took {time}");
    }

    #[test]
    fn diagonal_block_counts_dominant_steps() {
        let mut planner = Planner::new(&PlannerConfig::default());
        planner
            .enqueue(&BlockRequest::linear([300, -700, 0, 0], 600.0, 800.0, 2000.0))
            .unwrap();
        let block = *planner.current().unwrap();
        assert_eq!(block.dir_bits, StepperMask::S1);
        assert_eq!(block.steps, [300, 700, 0, 0]);
        let mut prep = Prep::new(&config());
        let (steps, _, peak) = run_block(&mut prep, block, 600.0);
        assert_eq!(steps, 700);
        assert!(peak <= 600.0 + 1e-3);
    }

    #[test]
    fn oversampling_engages_at_low_rate() {
        let block = single_block(2000, 100.0, 1000.0);
        let mut prep = Prep::new(&config());
        prep.load_block(&block, 0);
        prep.compute_profile(&block, 100.0, 0.0);
        let mut block = block;
        let mut levels = Vec::new();
        while prep.block_active {
            let slice = prep.next_segment(&block);
            if let Some(segment) = slice.segment {
                assert_eq!(segment.n_events, segment.dominant_steps() << segment.dss_level);
                levels.push(segment.dss_level);
            }
            block.remaining = slice.remaining;
        }
        // Default cap is 3; at 100 steps/s the cutoff of 500 Hz is crossed at level 3.
        assert!(levels.iter().any(|&l| l == 3));
    }
}
