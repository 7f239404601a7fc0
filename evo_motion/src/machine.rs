//! The machine: one owned state shared by the step clock and the background.
//!
//! [`Machine`] owns the planner, the interpolator, the geometry, the
//! real-time coordinator and the board. The step-clock glue calls
//! [`Machine::on_step_assert`] / [`Machine::on_step_reset`], the input glue
//! calls the edge handlers, and the main loop calls
//! [`Machine::run_background`] as often as it can.
//!
//! ```text
//!  LineRequest ──▶ queue_line ──▶ segment_motion ──▶ inverse ──▶ Planner
//!                                                                  │
//!  run_background ──▶ execute_realtime ──▶ prep_segment ◀──────────┘
//!                                              │
//!  step clock ──▶ on_step_assert ◀── segments ─┘
//! ```
//!
//! Background code that touches state the step callback reads runs inside
//! [`Machine::critical`], which masks the step clock for its duration.
//!
//! A line whose waypoints do not all fit in the planner stays pending and
//! is fed in by later background passes; new lines are refused with
//! [`MotionError::Busy`] until it is gone.

use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::hal::Board;
use evo_common::motion::block::{BlockFlags, BlockRequest, Coolant, StepperMask, ToolState};
use evo_common::motion::overrides::Overrides;
use evo_common::motion::state::{AlarmCode, ExecState, MachineStatus};
use evo_common::motion::telemetry::{BufferCounters, ProbeResult, StatusSnapshot};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{EnqueueError, MotionError};
use crate::homing::{HomingCycle, HomingInputs, HomingTick};
use crate::interpolator::Interpolator;
use crate::kinematics::{self, Kinematics, SegmentIter};
use crate::planner::Planner;
use crate::realtime::{Coordinator, ProbeState};

// ─── Motion Requests ────────────────────────────────────────────────

/// A straight machine-space move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineRequest {
    /// Absolute machine position [mm].
    pub target: [f32; AXIS_COUNT],
    /// Feed rate [mm/min]; ignored for rapids.
    pub feed: f32,
    pub flags: BlockFlags,
    pub tool: ToolState,
    /// Source line number.
    pub line: u32,
}

impl LineRequest {
    pub const fn feed(target: [f32; AXIS_COUNT], feed: f32) -> Self {
        Self {
            target,
            feed,
            flags: BlockFlags::empty(),
            tool: ToolState {
                spindle: 0.0,
                coolant: Coolant::empty(),
            },
            line: 0,
        }
    }

    /// Traverse at the highest rate the steppers allow.
    pub const fn rapid(target: [f32; AXIS_COUNT]) -> Self {
        Self::feed(target, 0.0).with_flags(BlockFlags::RAPID)
    }

    pub const fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    pub const fn with_tool(mut self, tool: ToolState) -> Self {
        self.tool = tool;
        self
    }

    pub const fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

/// Waypoints of an accepted line not yet in the planner.
#[derive(Debug)]
struct PendingLine {
    waypoints: SegmentIter,
    next: Option<[f32; AXIS_COUNT]>,
    /// End of the last queued sub-segment.
    from: [f32; AXIS_COUNT],
    request: LineRequest,
    queued: u32,
}

impl PendingLine {
    fn peek(&mut self) -> Option<[f32; AXIS_COUNT]> {
        if self.next.is_none() {
            self.next = self.waypoints.next();
        }
        self.next
    }
}

/// Stepper-space block for the sub-segment `from → to`.
fn block_request(
    settings: &Settings,
    request: &LineRequest,
    from: [f32; AXIS_COUNT],
    to: [f32; AXIS_COUNT],
    steps: [i32; STEPPER_COUNT],
) -> BlockRequest {
    let limits = settings.path_limits(&steps);
    let length_mm = from
        .iter()
        .zip(&to)
        .map(|(a, b)| (b - a) * (b - a))
        .sum::<f32>()
        .sqrt();
    let path = steps
        .iter()
        .map(|&s| (s as f32) * (s as f32))
        .sum::<f32>()
        .sqrt();
    let feed = if request.flags.contains(BlockFlags::RAPID) || length_mm <= 0.0 {
        limits.max_rate
    } else {
        request.feed / 60.0 * path / length_mm
    };
    BlockRequest {
        steps,
        feed,
        max_rate: limits.max_rate,
        acceleration: limits.acceleration,
        flags: request.flags,
        tool: request.tool,
        line: request.line,
        length_mm,
    }
}

// ─── Machine ────────────────────────────────────────────────────────

pub struct Machine<B: Board> {
    pub(crate) settings: Settings,
    pub(crate) kinematics: Box<dyn Kinematics>,
    pub(crate) planner: Planner,
    pub(crate) itp: Interpolator,
    pub(crate) rt: Coordinator,
    pub(crate) overrides: Overrides,
    pub(crate) board: B,
    pub(crate) homing: Option<HomingCycle>,
    pending: Option<PendingLine>,
    /// Machine-space end of the newest queued motion [mm].
    planned: [f32; AXIS_COUNT],
    pub(crate) probe: Option<ProbeResult>,
}

impl<B: Board> Machine<B> {
    pub fn new(settings: Settings, board: B) -> Self {
        let kinematics = kinematics::build(&settings);
        let initial = if settings.homing.enabled {
            ExecState::UNHOMED
        } else {
            ExecState::empty()
        };
        info!(
            kinematics = kinematics.name(),
            homing = settings.homing.enabled,
            hard_limits = settings.limits.hard_limits,
            soft_limits = settings.limits.soft_limits,
            "Machine ready"
        );
        let planned = kinematics.forward(&[0; STEPPER_COUNT]);
        Self {
            planner: Planner::new(&settings.planner),
            itp: Interpolator::new(&settings.interpolator),
            rt: Coordinator::new(initial),
            overrides: Overrides::default(),
            homing: None,
            pending: None,
            planned,
            probe: None,
            kinematics,
            settings,
            board,
        }
    }

    // ─── Step Clock ─────────────────────────────────────────────────

    #[inline]
    pub fn on_step_assert(&mut self) {
        self.itp.on_step_assert(&mut self.board);
    }

    #[inline]
    pub fn on_step_reset(&mut self) {
        self.itp.on_step_reset(&mut self.board);
    }

    /// Run `f` with step-clock callbacks held off.
    pub fn critical<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.board.mask();
        let result = f(self);
        self.board.unmask();
        result
    }

    // ─── Execution State ────────────────────────────────────────────

    #[inline]
    pub fn get_exec_state(&self, mask: ExecState) -> ExecState {
        self.rt.exec.get(mask)
    }

    #[inline]
    pub fn set_exec_state(&self, bits: ExecState) {
        self.rt.exec.set(bits);
    }

    #[inline]
    pub fn clear_exec_state(&self, bits: ExecState) {
        self.rt.exec.clear(bits);
    }

    #[inline]
    pub fn status(&self) -> MachineStatus {
        self.rt.exec.status()
    }

    #[inline]
    pub fn alarm(&self) -> Option<AlarmCode> {
        self.rt.exec.alarm()
    }

    /// Latch or queue a real-time command byte; `false` for ordinary
    /// stream bytes.
    #[inline]
    pub fn inject_realtime(&mut self, byte: u8) -> bool {
        self.rt.events.inject_byte(byte)
    }

    /// Whether a status report was requested since the last call.
    #[inline]
    pub fn take_status_request(&self) -> bool {
        self.rt.take_status_request()
    }

    // ─── Motion Requests ────────────────────────────────────────────

    fn check_motion_allowed(&self, system: bool) -> Result<(), MotionError> {
        if self.rt.exec.any(ExecState::MOTION_LOCK_MASK) {
            return Err(MotionError::Locked {
                alarm: self.rt.exec.alarm(),
            });
        }
        if !system && self.settings.homing.enabled && self.rt.exec.any(ExecState::UNHOMED) {
            return Err(MotionError::Unhomed);
        }
        if self.pending.is_some() || self.homing.is_some() {
            return Err(MotionError::Busy);
        }
        Ok(())
    }

    /// Queue a straight machine-space move.
    ///
    /// Non-linear geometries split the move into sub-segments. Returns
    /// `Enqueue(QueueFull)` when not even the first sub-segment fits; the
    /// caller retries later. Once accepted, sub-segments that do not fit are
    /// fed in by [`Machine::run_background`].
    pub fn queue_line(&mut self, request: LineRequest) -> Result<(), MotionError> {
        self.check_motion_allowed(false)?;
        let rapid = request.flags.contains(BlockFlags::RAPID);
        if !rapid && !(request.feed.is_finite() && request.feed > 0.0) {
            return Err(MotionError::InvalidFeed(request.feed));
        }
        if self.settings.limits.soft_limits && !self.kinematics.within_travel_bounds(&request.target)
        {
            warn!(target = ?request.target, "Soft limit: move rejected");
            return Err(MotionError::SoftLimit {
                target: request.target,
            });
        }

        self.pending = Some(PendingLine {
            waypoints: self.kinematics.segment_motion(self.planned, request.target),
            next: None,
            from: self.planned,
            request,
            queued: 0,
        });
        self.pump_pending()?;

        if let Some(line) = &self.pending {
            if line.queued == 0 {
                self.pending = None;
                return Err(EnqueueError::QueueFull.into());
            }
        }
        Ok(())
    }

    /// Queue a jog. Jogs are refused while program motion or a hold is in
    /// progress and can be cancelled with the jog-cancel command.
    pub fn queue_jog(&mut self, target: [f32; AXIS_COUNT], feed: f32) -> Result<(), MotionError> {
        let program_active = !self.rt.exec.any(ExecState::JOG)
            && (!self.planner.is_empty() || !self.itp.is_idle());
        if program_active || self.rt.exec.any(ExecState::HOLD) {
            return Err(MotionError::Busy);
        }
        self.queue_line(LineRequest::feed(target, feed).with_flags(BlockFlags::JOG))?;
        self.rt.exec.set(ExecState::JOG);
        Ok(())
    }

    /// Queue a probing move toward `target`. Contact stops the move and
    /// records a [`ProbeResult`]; finishing without contact is an alarm.
    pub fn queue_probe(&mut self, target: [f32; AXIS_COUNT], feed: f32) -> Result<(), MotionError> {
        self.check_motion_allowed(false)?;
        if !self.is_idle() {
            return Err(MotionError::Busy);
        }
        if self.board.probe() {
            self.rt.trip(ExecState::HALT, AlarmCode::ProbeFailInitial);
            return Err(MotionError::ProbeTriggered);
        }
        self.probe = None;
        self.rt.probe = ProbeState::Armed;
        let result = self.queue_line(LineRequest::feed(target, feed).with_flags(BlockFlags::PROBE));
        if result.is_err() {
            self.rt.probe = ProbeState::Idle;
        }
        result
    }

    /// Feed pending sub-segments into the planner until it is full.
    fn pump_pending(&mut self) -> Result<(), MotionError> {
        let Self {
            pending,
            planner,
            kinematics,
            settings,
            planned,
            ..
        } = self;
        let Some(line) = pending.as_mut() else {
            return Ok(());
        };

        let result = (|| -> Result<bool, MotionError> {
            while let Some(point) = line.peek() {
                let target = kinematics.inverse(&point)?;
                let position = planner.position();
                let mut steps = [0i32; STEPPER_COUNT];
                for (i, s) in steps.iter_mut().enumerate() {
                    *s = target[i].wrapping_sub(position[i]);
                }
                if steps.iter().any(|&s| s != 0) {
                    let block = block_request(settings, &line.request, line.from, point, steps);
                    match planner.enqueue(&block) {
                        Ok(_) => {}
                        Err(EnqueueError::QueueFull) => return Ok(false),
                        Err(e) => return Err(e.into()),
                    }
                    line.queued += 1;
                    line.from = point;
                }
                line.next = None;
                *planned = point;
            }
            Ok(true)
        })();

        match result {
            Ok(false) => Ok(()),
            Ok(true) => {
                *pending = None;
                Ok(())
            }
            Err(e) => {
                *pending = None;
                Err(e)
            }
        }
    }

    // ─── Homing ─────────────────────────────────────────────────────

    /// Start the homing cycle.
    pub fn home(&mut self) -> Result<(), MotionError> {
        if !self.settings.homing.enabled {
            return Err(MotionError::HomingDisabled);
        }
        self.check_motion_allowed(true)?;
        if !self.is_idle() {
            return Err(MotionError::Busy);
        }
        self.homing = Some(HomingCycle::new(
            self.kinematics.home_sequence(),
            &self.settings,
        ));
        self.rt.exec.set(ExecState::HOMING);
        info!(kinematics = self.kinematics.name(), "Homing cycle started");
        self.tick_homing();
        Ok(())
    }

    pub(crate) fn tick_homing(&mut self) {
        let Some(cycle) = self.homing.as_mut() else {
            return;
        };
        let inputs = HomingInputs {
            limits_reached: self.rt.homing_reached,
            motion_done: self.itp.is_idle() && self.planner.is_empty(),
            limits: self.board.limits(),
        };
        match cycle.tick(&inputs) {
            HomingTick::InProgress => {}
            HomingTick::Move(mv) => {
                let pass = cycle.pass();
                self.discard_motion();
                self.itp.set_locked(StepperMask::empty());
                self.rt.homing_reached = false;
                self.rt.homing_target = mv.approach.then_some(mv.limit_mask);
                debug!(pass, approach = mv.approach, steps = ?mv.request.steps, "Homing move");
                if let Err(e) = self.planner.enqueue(&mv.request) {
                    error!(error = %e, "Homing move rejected");
                    self.fail_homing(AlarmCode::HomingFailApproach);
                    return;
                }
                if mv.approach {
                    // A switch closed before the approach starts.
                    self.on_limits_changed();
                }
            }
            HomingTick::Complete => self.finish_homing(),
            HomingTick::Failed(code) => self.fail_homing(code),
        }
    }

    fn finish_homing(&mut self) {
        let home = self.kinematics.home_position();
        match self.kinematics.inverse(&home) {
            Ok(steps) => {
                self.sync_positions(steps);
                self.planned = home;
                self.homing = None;
                self.rt.homing_target = None;
                self.rt.exec.clear(ExecState::HOMING | ExecState::UNHOMED);
                info!(position = ?home, "Homing complete");
            }
            Err(e) => {
                error!(error = %e, "Home position unreachable");
                self.fail_homing(AlarmCode::HomingFailApproach);
            }
        }
    }

    fn fail_homing(&mut self, code: AlarmCode) {
        self.discard_motion();
        self.itp.set_locked(StepperMask::empty());
        self.homing = None;
        self.rt.homing_target = None;
        self.rt.homing_reached = false;
        self.rt.exec.clear(ExecState::HOMING);
        self.rt.trip(ExecState::HALT, code);
    }

    // ─── Probing ────────────────────────────────────────────────────

    /// Finish a probing move the probe handler stopped.
    pub(crate) fn check_probe(&mut self) {
        let ProbeState::Tripped(steps) = self.rt.probe else {
            return;
        };
        self.discard_motion();
        self.sync_positions(steps);
        let position = self.kinematics.forward(&steps);
        self.probe = Some(ProbeResult {
            steps,
            position,
            success: true,
        });
        self.rt.probe = ProbeState::Idle;
        info!(position = ?position, "Probe contact");
    }

    /// A probing move ran out without contact.
    pub(crate) fn fail_probe(&mut self) {
        let steps = self.itp.rt_position();
        self.probe = Some(ProbeResult {
            steps,
            position: self.kinematics.forward(&steps),
            success: false,
        });
        self.rt.probe = ProbeState::Idle;
        self.rt.trip(ExecState::HALT, AlarmCode::ProbeFailContact);
    }

    // ─── Position ───────────────────────────────────────────────────

    /// Stop, drop every queued and pending move and resynchronize the
    /// planner to the emitted position.
    pub(crate) fn discard_motion(&mut self) {
        self.critical(|m| {
            m.itp.stop(&mut m.board);
            m.planner.flush();
        });
        self.pending = None;
        let steps = self.itp.rt_position();
        self.sync_positions(steps);
    }

    fn sync_positions(&mut self, steps: [i32; STEPPER_COUNT]) {
        self.critical(|m| m.itp.sync_position(steps));
        self.planner.sync_position(steps);
        self.planned = self.kinematics.forward(&steps);
    }

    // ─── Background ─────────────────────────────────────────────────

    /// One background pass: act on real-time events, feed the planner and
    /// the segment queue, and keep the step clock running.
    pub fn run_background(&mut self) {
        self.execute_realtime();
        if let Some(alarm) = self.rt.take_new_alarm() {
            error!(%alarm, "Alarm");
        }
        if self.rt.exec.any(ExecState::HALT | ExecState::KILL) {
            self.enter_halt();
            return;
        }

        if let Err(e) = self.pump_pending() {
            warn!(error = %e, "Pending line dropped");
        }
        self.tick_homing();
        self.check_probe();
        self.update_hold();

        let stopped_by_handler = self.rt.homing_reached
            || matches!(self.rt.probe, ProbeState::Tripped(_))
            || self.rt.exec.any(ExecState::HALT | ExecState::KILL);
        if !stopped_by_handler {
            while let Some(prepared) =
                self.itp
                    .prep_segment(&mut self.planner, &self.overrides, &mut self.board)
            {
                self.critical(|m| m.itp.commit(prepared));
            }
            if self.itp.start(&mut self.board) && self.rt.exec.any(ExecState::RESUMING) {
                self.rt.exec.clear(ExecState::RESUMING);
            }
        }
        self.update_run_state();
    }

    /// Halt or kill latched: drop motion and tool outputs once.
    fn enter_halt(&mut self) {
        if self.rt.halt_handled {
            return;
        }
        self.rt.halt_handled = true;
        self.discard_motion();
        self.itp.set_locked(StepperMask::empty());
        if self.homing.take().is_some() {
            self.rt.homing_target = None;
            self.rt.homing_reached = false;
        }
        if self.rt.probe != ProbeState::Idle {
            self.rt.probe = ProbeState::Idle;
        }
        self.board.set_spindle(0.0);
        self.board.set_coolant(Coolant::empty());
        self.itp.clear_tool();
        self.rt.exec.clear(
            ExecState::RUN | ExecState::JOG | ExecState::RESUMING | ExecState::HOMING,
        );
        warn!(status = self.status().label(), "Motion halted; reset required");
    }

    fn update_run_state(&mut self) {
        if self.is_moving() {
            if !self.rt.exec.any(ExecState::HOLD) {
                self.rt.exec.set(ExecState::RUN);
            }
            return;
        }
        self.rt
            .exec
            .clear(ExecState::RUN | ExecState::JOG | ExecState::RESUMING);
        if self.rt.probe == ProbeState::Armed {
            self.fail_probe();
        }
    }

    pub(crate) fn is_moving(&self) -> bool {
        self.itp.is_running()
            || !self.itp.is_idle()
            || !self.planner.is_empty()
            || self.pending.is_some()
    }

    /// Nothing queued, executing, homing or holding.
    pub fn is_idle(&self) -> bool {
        !self.is_moving()
            && self.homing.is_none()
            && !self
                .rt
                .exec
                .any(ExecState::RUN | ExecState::JOG | ExecState::HOMING | ExecState::HOLD)
    }

    // ─── Telemetry ──────────────────────────────────────────────────

    /// Machine position from the emitted step counters [mm].
    pub fn position(&self) -> [f32; AXIS_COUNT] {
        self.kinematics.forward(&self.itp.rt_position())
    }

    pub fn buffer_counters(&self) -> BufferCounters {
        let planner = self.planner.overflow_counters();
        BufferCounters {
            planner_queued: planner.queued,
            planner_free: planner.free,
            planner_capacity: planner.capacity,
            rejected_full: planner.rejected_full,
            replans: planner.replans,
            segments_queued: self.itp.segments_queued(),
            underruns: self.itp.underruns(),
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let steps = self.itp.rt_position();
        StatusSnapshot {
            status: self.status(),
            alarm: self.alarm(),
            position: self.kinematics.forward(&steps),
            steps,
            feed: self.itp.realtime_feed(),
            spindle: self.overrides.scale_spindle(self.itp.tool().spindle),
            overrides: self.overrides,
            buffers: self.buffer_counters(),
            probe: self.probe,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn kinematics(&self) -> &dyn Kinematics {
        self.kinematics.as_ref()
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.itp
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.rt
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn probe_result(&self) -> Option<ProbeResult> {
        self.probe
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// Machine-space end of the newest queued motion [mm].
    pub fn planned_position(&self) -> [f32; AXIS_COUNT] {
        self.planned
    }
}
