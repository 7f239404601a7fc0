//! Execution-state cell.
//!
//! Written from input handlers and the step callback, read and cleared from
//! the background loop. Every operation is a single atomic access, so a
//! handler that preempts the background never observes a half-updated
//! state.

use core::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use evo_common::motion::state::{AlarmCode, ExecState, MachineStatus};

/// Execution-state bits plus the latched alarm code.
#[derive(Debug, Default)]
pub struct ExecStateCell {
    bits: AtomicU16,
    alarm: AtomicU8,
}

impl ExecStateCell {
    pub const fn new(initial: ExecState) -> Self {
        Self {
            bits: AtomicU16::new(initial.bits()),
            alarm: AtomicU8::new(0),
        }
    }

    /// State bits intersected with `mask`.
    #[inline]
    pub fn get(&self, mask: ExecState) -> ExecState {
        ExecState::from_bits_truncate(self.bits.load(Ordering::Acquire)) & mask
    }

    /// Whether any bit of `mask` is set.
    #[inline]
    pub fn any(&self, mask: ExecState) -> bool {
        !self.get(mask).is_empty()
    }

    #[inline]
    pub fn snapshot(&self) -> ExecState {
        self.get(ExecState::all())
    }

    #[inline]
    pub fn set(&self, bits: ExecState) {
        self.bits.fetch_or(bits.bits(), Ordering::AcqRel);
    }

    #[inline]
    pub fn clear(&self, bits: ExecState) {
        self.bits.fetch_and(!bits.bits(), Ordering::AcqRel);
    }

    /// Latch `code` unless an alarm is already latched; the first cause wins.
    #[inline]
    pub fn raise_alarm(&self, code: AlarmCode) -> bool {
        self.alarm
            .compare_exchange(0, code as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn alarm(&self) -> Option<AlarmCode> {
        AlarmCode::from_u8(self.alarm.load(Ordering::Acquire))
    }

    #[inline]
    pub fn clear_alarm(&self) {
        self.alarm.store(0, Ordering::Release);
    }

    /// The single externally reported status.
    #[inline]
    pub fn status(&self) -> MachineStatus {
        MachineStatus::from_exec(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_are_independent() {
        let cell = ExecStateCell::new(ExecState::UNHOMED);
        cell.set(ExecState::RUN | ExecState::HOLD);
        cell.clear(ExecState::RUN);
        assert_eq!(cell.snapshot(), ExecState::UNHOMED | ExecState::HOLD);
        assert_eq!(cell.get(ExecState::HOLD | ExecState::DOOR), ExecState::HOLD);
        assert!(cell.any(ExecState::HOLD | ExecState::KILL));
        assert!(!cell.any(ExecState::KILL));
        assert_eq!(cell.status(), MachineStatus::Hold);
    }

    #[test]
    fn first_alarm_wins() {
        let cell = ExecStateCell::default();
        assert!(cell.alarm().is_none());
        assert!(cell.raise_alarm(AlarmCode::HardLimit));
        assert!(!cell.raise_alarm(AlarmCode::EmergencyStop));
        assert_eq!(cell.alarm(), Some(AlarmCode::HardLimit));
        cell.clear_alarm();
        assert!(cell.alarm().is_none());
    }
}
