//! Override percentages and the single-byte real-time command table.
//!
//! Real-time commands bypass the line-oriented command stream: a protocol
//! layer forwards the byte as soon as it arrives and the core latches it for
//! the next background pass. Codes follow Grbl 1.1 so existing senders work.

use serde::{Deserialize, Serialize};

use super::block::Coolant;
use crate::config::ConfigError;

// ─── Override Ranges ────────────────────────────────────────────────

/// Permitted range and step sizes for one override kind [%].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRange {
    /// Lowest allowed percentage.
    pub min: u8,
    /// Highest allowed percentage.
    pub max: u8,
    /// Coarse increment.
    pub coarse: u8,
    /// Fine increment.
    pub fine: u8,
}

impl OverrideRange {
    /// Feed and spindle default: 10..=200 %, ±10 / ±1.
    pub const DEFAULT: Self = Self {
        min: 10,
        max: 200,
        coarse: 10,
        fine: 1,
    };

    /// Clamp a requested percentage into range.
    #[inline]
    pub fn clamp(&self, pct: i16) -> u8 {
        pct.clamp(self.min as i16, self.max as i16) as u8
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.min == 0 || self.min > 100 || self.max < 100 {
            return Err(ConfigError::ValidationError(format!(
                "{name} override range [{}, {}] must contain 100 and start above 0",
                self.min, self.max
            )));
        }
        if self.fine == 0 || self.coarse < self.fine {
            return Err(ConfigError::ValidationError(format!(
                "{name} override increments coarse={} fine={} invalid",
                self.coarse, self.fine
            )));
        }
        Ok(())
    }
}

impl Default for OverrideRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Override configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Feed override range.
    #[serde(default)]
    pub feed: OverrideRange,
    /// Spindle override range.
    #[serde(default)]
    pub spindle: OverrideRange,
}

impl OverrideConfig {
    /// Validate both ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feed.validate("feed")?;
        self.spindle.validate("spindle")
    }
}

// ─── Real-Time Commands ─────────────────────────────────────────────

/// Single-byte real-time command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RtCommand {
    Reset,
    StatusReport,
    FeedHold,
    CycleStart,
    SafetyDoor,
    JogCancel,
    FeedReset,
    FeedCoarsePlus,
    FeedCoarseMinus,
    FeedFinePlus,
    FeedFineMinus,
    RapidFull,
    RapidHalf,
    RapidQuarter,
    SpindleReset,
    SpindleCoarsePlus,
    SpindleCoarseMinus,
    SpindleFinePlus,
    SpindleFineMinus,
    SpindleStopToggle,
    FloodToggle,
    MistToggle,
}

impl RtCommand {
    /// Decode a real-time byte. Returns `None` for ordinary stream bytes.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x18 => Some(Self::Reset),
            b'?' => Some(Self::StatusReport),
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleStart),
            0x84 => Some(Self::SafetyDoor),
            0x85 => Some(Self::JogCancel),
            0x90 => Some(Self::FeedReset),
            0x91 => Some(Self::FeedCoarsePlus),
            0x92 => Some(Self::FeedCoarseMinus),
            0x93 => Some(Self::FeedFinePlus),
            0x94 => Some(Self::FeedFineMinus),
            0x95 => Some(Self::RapidFull),
            0x96 => Some(Self::RapidHalf),
            0x97 => Some(Self::RapidQuarter),
            0x99 => Some(Self::SpindleReset),
            0x9A => Some(Self::SpindleCoarsePlus),
            0x9B => Some(Self::SpindleCoarseMinus),
            0x9C => Some(Self::SpindleFinePlus),
            0x9D => Some(Self::SpindleFineMinus),
            0x9E => Some(Self::SpindleStopToggle),
            0xA0 => Some(Self::FloodToggle),
            0xA1 => Some(Self::MistToggle),
            _ => None,
        }
    }

    /// Whether the command steps or toggles override state. Each such byte
    /// counts, so these are queued rather than latched.
    pub const fn is_override(&self) -> bool {
        matches!(
            self,
            Self::FeedReset
                | Self::FeedCoarsePlus
                | Self::FeedCoarseMinus
                | Self::FeedFinePlus
                | Self::FeedFineMinus
                | Self::RapidFull
                | Self::RapidHalf
                | Self::RapidQuarter
                | Self::SpindleReset
                | Self::SpindleCoarsePlus
                | Self::SpindleCoarseMinus
                | Self::SpindleFinePlus
                | Self::SpindleFineMinus
                | Self::SpindleStopToggle
                | Self::FloodToggle
                | Self::MistToggle
        )
    }
}

// ─── Override State ─────────────────────────────────────────────────

/// Which override a command touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    Feed,
    Rapid,
    Spindle,
    Coolant,
}

/// Current override percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Feed override [%].
    pub feed: u8,
    /// Rapid override [%] (100, 50 or 25).
    pub rapid: u8,
    /// Spindle speed override [%].
    pub spindle: u8,
    /// Spindle stop override active.
    pub spindle_stopped: bool,
    /// Coolant outputs inverted relative to the programmed state.
    pub coolant_toggled: Coolant,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
            spindle_stopped: false,
            coolant_toggled: Coolant::empty(),
        }
    }
}

impl Overrides {
    /// Apply an override command. Returns which override changed, if any.
    pub fn apply(&mut self, cmd: RtCommand, config: &OverrideConfig) -> Option<OverrideKind> {
        let (feed, spindle) = (&config.feed, &config.spindle);
        let current_feed = self.feed as i16;
        let current_spindle = self.spindle as i16;
        let (kind, changed) = match cmd {
            RtCommand::FeedReset => (OverrideKind::Feed, Self::set(&mut self.feed, 100)),
            RtCommand::FeedCoarsePlus => (
                OverrideKind::Feed,
                Self::set(&mut self.feed, feed.clamp(current_feed + feed.coarse as i16)),
            ),
            RtCommand::FeedCoarseMinus => (
                OverrideKind::Feed,
                Self::set(&mut self.feed, feed.clamp(current_feed - feed.coarse as i16)),
            ),
            RtCommand::FeedFinePlus => (
                OverrideKind::Feed,
                Self::set(&mut self.feed, feed.clamp(current_feed + feed.fine as i16)),
            ),
            RtCommand::FeedFineMinus => (
                OverrideKind::Feed,
                Self::set(&mut self.feed, feed.clamp(current_feed - feed.fine as i16)),
            ),
            RtCommand::RapidFull => (OverrideKind::Rapid, Self::set(&mut self.rapid, 100)),
            RtCommand::RapidHalf => (OverrideKind::Rapid, Self::set(&mut self.rapid, 50)),
            RtCommand::RapidQuarter => (OverrideKind::Rapid, Self::set(&mut self.rapid, 25)),
            RtCommand::SpindleReset => (OverrideKind::Spindle, Self::set(&mut self.spindle, 100)),
            RtCommand::SpindleCoarsePlus => (
                OverrideKind::Spindle,
                Self::set(
                    &mut self.spindle,
                    spindle.clamp(current_spindle + spindle.coarse as i16),
                ),
            ),
            RtCommand::SpindleCoarseMinus => (
                OverrideKind::Spindle,
                Self::set(
                    &mut self.spindle,
                    spindle.clamp(current_spindle - spindle.coarse as i16),
                ),
            ),
            RtCommand::SpindleFinePlus => (
                OverrideKind::Spindle,
                Self::set(
                    &mut self.spindle,
                    spindle.clamp(current_spindle + spindle.fine as i16),
                ),
            ),
            RtCommand::SpindleFineMinus => (
                OverrideKind::Spindle,
                Self::set(
                    &mut self.spindle,
                    spindle.clamp(current_spindle - spindle.fine as i16),
                ),
            ),
            RtCommand::SpindleStopToggle => {
                self.spindle_stopped = !self.spindle_stopped;
                (OverrideKind::Spindle, true)
            }
            RtCommand::FloodToggle => {
                self.coolant_toggled.toggle(Coolant::FLOOD);
                (OverrideKind::Coolant, true)
            }
            RtCommand::MistToggle => {
                self.coolant_toggled.toggle(Coolant::MIST);
                (OverrideKind::Coolant, true)
            }
            _ => return None,
        };
        changed.then_some(kind)
    }

    /// Effective spindle speed after override and stop toggle.
    #[inline]
    pub fn scale_spindle(&self, programmed: f32) -> f32 {
        if self.spindle_stopped {
            0.0
        } else {
            programmed * self.spindle as f32 / 100.0
        }
    }

    /// Effective coolant outputs after the flood/mist toggles.
    #[inline]
    pub fn apply_coolant(&self, programmed: Coolant) -> Coolant {
        programmed ^ self.coolant_toggled
    }

    fn set(slot: &mut u8, value: u8) -> bool {
        let changed = *slot != value;
        *slot = value;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_grbl_bytes() {
        assert_eq!(RtCommand::from_byte(b'!'), Some(RtCommand::FeedHold));
        assert_eq!(RtCommand::from_byte(b'~'), Some(RtCommand::CycleStart));
        assert_eq!(RtCommand::from_byte(0x18), Some(RtCommand::Reset));
        assert_eq!(RtCommand::from_byte(0x97), Some(RtCommand::RapidQuarter));
        assert_eq!(RtCommand::from_byte(b'G'), None);
        assert_eq!(RtCommand::from_byte(0x98), None);
    }

    #[test]
    fn feed_override_clamps_to_range() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        for _ in 0..20 {
            ovr.apply(RtCommand::FeedCoarsePlus, &cfg);
        }
        assert_eq!(ovr.feed, 200);
        for _ in 0..40 {
            ovr.apply(RtCommand::FeedCoarseMinus, &cfg);
        }
        assert_eq!(ovr.feed, 10);
        assert_eq!(ovr.apply(RtCommand::FeedCoarseMinus, &cfg), None);
        assert_eq!(
            ovr.apply(RtCommand::FeedReset, &cfg),
            Some(OverrideKind::Feed)
        );
        assert_eq!(ovr.feed, 100);
    }

    #[test]
    fn steps_accumulate_from_current_value() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        ovr.apply(RtCommand::SpindleCoarseMinus, &cfg);
        ovr.apply(RtCommand::SpindleFineMinus, &cfg);
        ovr.apply(RtCommand::SpindleFineMinus, &cfg);
        assert_eq!(ovr.spindle, 88);
        ovr.apply(RtCommand::FeedFinePlus, &cfg);
        ovr.apply(RtCommand::FeedCoarsePlus, &cfg);
        assert_eq!(ovr.feed, 111);
    }

    #[test]
    fn rapid_override_uses_fixed_levels() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        assert_eq!(ovr.apply(RtCommand::RapidHalf, &cfg), Some(OverrideKind::Rapid));
        assert_eq!(ovr.rapid, 50);
        ovr.apply(RtCommand::RapidQuarter, &cfg);
        assert_eq!(ovr.rapid, 25);
    }

    #[test]
    fn spindle_stop_zeroes_speed() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        ovr.apply(RtCommand::SpindleFinePlus, &cfg);
        assert!((ovr.scale_spindle(1000.0) - 1010.0).abs() < 1e-3);
        ovr.apply(RtCommand::SpindleStopToggle, &cfg);
        assert_eq!(ovr.scale_spindle(1000.0), 0.0);
    }

    #[test]
    fn coolant_toggles_invert_programmed_state() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        assert_eq!(ovr.apply(RtCommand::MistToggle, &cfg), Some(OverrideKind::Coolant));
        assert_eq!(ovr.apply_coolant(Coolant::FLOOD), Coolant::FLOOD | Coolant::MIST);
        ovr.apply(RtCommand::FloodToggle, &cfg);
        assert_eq!(ovr.apply_coolant(Coolant::FLOOD), Coolant::MIST);
        ovr.apply(RtCommand::MistToggle, &cfg);
        assert_eq!(ovr.apply_coolant(Coolant::empty()), Coolant::FLOOD);
    }

    #[test]
    fn non_override_commands_ignored() {
        let cfg = OverrideConfig::default();
        let mut ovr = Overrides::default();
        assert_eq!(ovr.apply(RtCommand::FeedHold, &cfg), None);
        assert_eq!(ovr, Overrides::default());
        assert!(!RtCommand::CycleStart.is_override());
        assert!(RtCommand::SpindleStopToggle.is_override());
        assert!(RtCommand::MistToggle.is_override());
    }

    #[test]
    fn invalid_range_rejected() {
        let cfg = OverrideConfig {
            feed: OverrideRange {
                min: 110,
                max: 200,
                coarse: 10,
                fine: 1,
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(OverrideConfig::default().validate().is_ok());
    }
}
