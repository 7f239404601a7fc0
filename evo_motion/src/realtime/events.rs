//! Real-time command events.
//!
//! Hold, cycle start, reset, door, jog cancel and status requests only set
//! a bit; the background loop takes the whole set at once and acts on it
//! in a fixed order, so one of these injected twice before the background
//! runs is acted on once. Override steps and toggles are queued instead:
//! every byte counts and they apply in arrival order.

use core::sync::atomic::{AtomicU32, Ordering};

use evo_common::motion::overrides::RtCommand;
use heapless::spsc::Queue;

/// Override queue slots (one is kept free by the ring).
pub const OVERRIDE_QUEUE_SIZE: usize = 64;

const ALL_COMMANDS: [RtCommand; 22] = [
    RtCommand::Reset,
    RtCommand::StatusReport,
    RtCommand::FeedHold,
    RtCommand::CycleStart,
    RtCommand::SafetyDoor,
    RtCommand::JogCancel,
    RtCommand::FeedReset,
    RtCommand::FeedCoarsePlus,
    RtCommand::FeedCoarseMinus,
    RtCommand::FeedFinePlus,
    RtCommand::FeedFineMinus,
    RtCommand::RapidFull,
    RtCommand::RapidHalf,
    RtCommand::RapidQuarter,
    RtCommand::SpindleReset,
    RtCommand::SpindleCoarsePlus,
    RtCommand::SpindleCoarseMinus,
    RtCommand::SpindleFinePlus,
    RtCommand::SpindleFineMinus,
    RtCommand::SpindleStopToggle,
    RtCommand::FloodToggle,
    RtCommand::MistToggle,
];

#[inline]
const fn bit(cmd: RtCommand) -> u32 {
    1 << (cmd as u32)
}

/// Pending command latch plus the override queue.
#[derive(Debug, Default)]
pub struct RtEvents {
    pending: AtomicU32,
    overrides: Queue<RtCommand, OVERRIDE_QUEUE_SIZE>,
    dropped: u32,
}

impl RtEvents {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            overrides: Queue::new(),
            dropped: 0,
        }
    }

    /// Latch a command. Override commands go through the queue instead.
    #[inline]
    pub fn latch(&self, cmd: RtCommand) {
        self.pending.fetch_or(bit(cmd), Ordering::AcqRel);
    }

    /// Decode a stream byte and latch or queue it. Returns `false` for
    /// ordinary bytes. A full override queue drops the byte and counts it.
    pub fn inject_byte(&mut self, byte: u8) -> bool {
        let Some(cmd) = RtCommand::from_byte(byte) else {
            return false;
        };
        if cmd.is_override() {
            if self.overrides.enqueue(cmd).is_err() {
                self.dropped = self.dropped.saturating_add(1);
            }
        } else {
            self.latch(cmd);
        }
        true
    }

    /// Take every latched command, clearing the latch.
    #[inline]
    pub fn take(&self) -> Pending {
        Pending(self.pending.swap(0, Ordering::AcqRel))
    }

    #[inline]
    pub fn is_pending(&self, cmd: RtCommand) -> bool {
        self.pending.load(Ordering::Acquire) & bit(cmd) != 0
    }

    /// Oldest queued override command.
    #[inline]
    pub fn next_override(&mut self) -> Option<RtCommand> {
        self.overrides.dequeue()
    }

    #[inline]
    pub fn overrides_queued(&self) -> usize {
        self.overrides.len()
    }

    /// Drop every queued override command.
    pub fn clear_overrides(&mut self) {
        while self.overrides.dequeue().is_some() {}
    }

    /// Override bytes lost to a full queue since the last call.
    pub fn take_dropped(&mut self) -> u32 {
        core::mem::take(&mut self.dropped)
    }
}

/// Commands taken from the latch in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending(u32);

impl Pending {
    #[inline]
    pub const fn contains(&self, cmd: RtCommand) -> bool {
        self.0 & bit(cmd) != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Latched commands in declaration order.
    pub fn iter(self) -> impl Iterator<Item = RtCommand> {
        ALL_COMMANDS.into_iter().filter(move |&c| self.contains(c))
    }
}
