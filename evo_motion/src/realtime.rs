//! Real-time execution-state coordination.
//!
//! Ties limit, control and probe inputs to motion without ever blocking or
//! logging in the handler context. Handlers do three kinds of things only:
//! stop the step clock, set [`ExecState`] bits with an [`AlarmCode`], and
//! latch command events. Everything user-visible happens afterwards in
//! [`Machine::execute_realtime`](crate::machine::Machine::execute_realtime).
//!
//! | Entry point | Context | Effect |
//! |-------------|---------|--------|
//! | `on_limits_changed` | input edge | homing stop / squaring lock, or hard-limit halt |
//! | `on_controls_changed` | input edge | kill, door, hold and cycle-start events |
//! | `on_probe_tripped` | input edge | latch contact position, stop |
//! | `execute_realtime` | background | act on latched events |
//! | `reset` | background | leave halt/kill once the source is gone |

pub mod dispatch;
pub mod events;
pub mod exec;
pub mod handlers;

use core::sync::atomic::{AtomicBool, Ordering};

use evo_common::consts::STEPPER_COUNT;
use evo_common::motion::block::StepperMask;
use evo_common::motion::state::{AlarmCode, ExecState};

pub use events::{Pending, RtEvents};
pub use exec::ExecStateCell;

/// Probing cycle progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    #[default]
    Idle,
    /// A probing move is queued; contact stops it.
    Armed,
    /// Contact made at this step position; awaiting background clean-up.
    Tripped([i32; STEPPER_COUNT]),
}

/// State shared between input handlers and the background loop.
#[derive(Debug)]
pub struct Coordinator {
    pub exec: ExecStateCell,
    pub events: RtEvents,
    pub(crate) probe: ProbeState,
    /// Limit inputs that end the current homing approach.
    pub(crate) homing_target: Option<StepperMask>,
    /// Every target limit tripped and the clock was stopped.
    pub(crate) homing_reached: bool,
    pub(crate) jog_cancel: bool,
    pub(crate) hold_parked: bool,
    /// Halt clean-up already done for the current alarm.
    pub(crate) halt_handled: bool,
    status_requested: AtomicBool,
    reported_alarm: Option<AlarmCode>,
}

impl Coordinator {
    pub fn new(initial: ExecState) -> Self {
        Self {
            exec: ExecStateCell::new(initial),
            events: RtEvents::new(),
            probe: ProbeState::Idle,
            homing_target: None,
            homing_reached: false,
            jog_cancel: false,
            hold_parked: false,
            halt_handled: false,
            status_requested: AtomicBool::new(false),
            reported_alarm: None,
        }
    }

    /// Set `bits` and latch `code` (first cause wins).
    #[inline]
    pub(crate) fn trip(&self, bits: ExecState, code: AlarmCode) {
        self.exec.set(bits);
        self.exec.raise_alarm(code);
    }

    #[inline]
    pub fn probe_state(&self) -> ProbeState {
        self.probe
    }

    pub(crate) fn request_status(&self) {
        self.status_requested.store(true, Ordering::Release);
    }

    /// Whether a status report was requested since the last call.
    #[inline]
    pub fn take_status_request(&self) -> bool {
        self.status_requested.swap(false, Ordering::AcqRel)
    }

    /// The latched alarm the first time it is seen, for reporting.
    pub(crate) fn take_new_alarm(&mut self) -> Option<AlarmCode> {
        let alarm = self.exec.alarm();
        if alarm == self.reported_alarm {
            return None;
        }
        self.reported_alarm = alarm;
        alarm
    }

    /// Forget everything but the state cell contents.
    pub(crate) fn clear_cycle(&mut self) {
        self.probe = ProbeState::Idle;
        self.homing_target = None;
        self.homing_reached = false;
        self.jog_cancel = false;
        self.hold_parked = false;
        self.halt_handled = false;
        self.reported_alarm = None;
    }
}
