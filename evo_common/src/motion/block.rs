//! Motion block request types.
//!
//! A [`BlockRequest`] is what motion control hands to the planner: a
//! stepper-space delta that kinematics has already produced, plus the speed
//! limits for that move expressed along the stepper-space path.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::STEPPER_COUNT;

bitflags! {
    /// One bit per physical stepper channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StepperMask: u8 {
        const S0 = 0x01;
        const S1 = 0x02;
        const S2 = 0x04;
        const S3 = 0x08;
    }
}

impl StepperMask {
    /// Mask with only stepper `index` set.
    #[inline]
    pub const fn of(index: usize) -> Self {
        Self::from_bits_truncate(1u8 << index)
    }

    /// Mask covering every configured stepper channel.
    #[inline]
    pub const fn every() -> Self {
        Self::from_bits_truncate(((1u16 << STEPPER_COUNT) - 1) as u8)
    }

    /// Whether stepper `index` is set.
    #[inline]
    pub const fn has(&self, index: usize) -> bool {
        self.bits() & (1u8 << index) != 0
    }
}

impl Default for StepperMask {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Per-block condition flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u8 {
        /// Rapid traverse: scaled by the rapid override, not the feed override.
        const RAPID            = 0x01;
        /// Spindle-synchronized move (feed follows spindle).
        const SPINDLE_SYNC     = 0x02;
        /// Set by the planner when the block was queued into an idle pipeline.
        const FIRST_SINCE_STOP = 0x04;
        /// Homing / parking motion: no overrides, no junction carry-over.
        const SYSTEM_MOTION    = 0x08;
        /// Ignore the feed override.
        const NO_FEED_OVERRIDE = 0x10;
        /// Jog motion.
        const JOG              = 0x20;
        /// Probing move: stops on probe contact.
        const PROBE            = 0x40;
    }
}

impl Default for BlockFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Coolant outputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Coolant: u8 {
        const FLOOD = 0x01;
        const MIST  = 0x02;
    }
}

impl Default for Coolant {
    fn default() -> Self {
        Self::empty()
    }
}

/// Tool state that applies from the start of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    /// Programmed spindle speed [rpm]; negative means counter-clockwise.
    pub spindle: f32,
    /// Coolant outputs.
    pub coolant: Coolant,
}

/// A validated, kinematics-transformed motion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRequest {
    /// Signed step delta per stepper, relative to the previous block's end.
    pub steps: [i32; STEPPER_COUNT],
    /// Requested cruise speed along the stepper-space path [steps/s].
    pub feed: f32,
    /// Highest cruise speed the steppers allow for this direction [steps/s].
    pub max_rate: f32,
    /// Acceleration limit along the path [steps/s²].
    pub acceleration: f32,
    /// Condition flags.
    pub flags: BlockFlags,
    /// Tool state applied when the block starts.
    pub tool: ToolState,
    /// Source line number (for reporting).
    pub line: u32,
    /// Machine-space length of the move [mm]; 0 when unknown. Reporting only.
    pub length_mm: f32,
}

impl BlockRequest {
    /// Plain feed move with the given limits and no tool change.
    pub const fn linear(
        steps: [i32; STEPPER_COUNT],
        feed: f32,
        max_rate: f32,
        acceleration: f32,
    ) -> Self {
        Self {
            steps,
            feed,
            max_rate,
            acceleration,
            flags: BlockFlags::empty(),
            tool: ToolState {
                spindle: 0.0,
                coolant: Coolant::empty(),
            },
            line: 0,
            length_mm: 0.0,
        }
    }

    /// Builder-style flag setter.
    pub const fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Builder-style machine length setter.
    pub const fn with_length(mut self, length_mm: f32) -> Self {
        self.length_mm = length_mm;
        self
    }

    /// Builder-style tool setter.
    pub const fn with_tool(mut self, tool: ToolState) -> Self {
        self.tool = tool;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepper_mask_helpers() {
        assert_eq!(StepperMask::of(2), StepperMask::S2);
        assert!(StepperMask::every().has(STEPPER_COUNT - 1));
        assert_eq!(StepperMask::every().bits().count_ones() as usize, STEPPER_COUNT);
        assert!(!StepperMask::S1.has(0));
    }

    #[test]
    fn linear_request_has_no_flags() {
        let req = BlockRequest::linear([10, 0, 0, 0], 100.0, 200.0, 50.0);
        assert!(req.flags.is_empty());
        assert_eq!(req.tool, ToolState::default());
        let rapid = req.with_flags(BlockFlags::RAPID);
        assert!(rapid.flags.contains(BlockFlags::RAPID));
    }
}
