//! Step-rate to timer-period mapping and DSS level selection.

use evo_common::consts::MAX_DSS_LEVEL;

/// Prescaler choices of a typical 16-bit timer.
pub const PRESCALERS: [u16; 5] = [1, 8, 64, 256, 1024];

/// Timer period for one step-clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    /// Counter reload value (1..=65535).
    pub ticks: u16,
    /// Source clock divider.
    pub prescaler: u16,
}

impl StepTiming {
    /// Source-clock cycles per tick.
    #[inline]
    pub const fn cycles(&self) -> u32 {
        self.ticks as u32 * self.prescaler as u32
    }

    /// Tick period [s].
    #[inline]
    pub fn period(&self, clock_hz: u32) -> f32 {
        self.cycles() as f32 / clock_hz as f32
    }
}

/// Map a tick rate [Hz] to the finest timer setting that represents it.
///
/// Uses the smallest prescaler whose reload value fits 16 bits. Rates
/// slower than the coarsest setting saturate at the longest period.
pub fn freq_to_clocks(clock_hz: u32, rate: f32) -> StepTiming {
    let cycles = (clock_hz as f32 / rate.max(f32::MIN_POSITIVE)).round();
    for prescaler in PRESCALERS {
        let ticks = (cycles / f32::from(prescaler)).round();
        if ticks <= f32::from(u16::MAX) {
            return StepTiming {
                ticks: (ticks as u16).max(1),
                prescaler,
            };
        }
    }
    StepTiming {
        ticks: u16::MAX,
        prescaler: PRESCALERS[PRESCALERS.len() - 1],
    }
}

/// Clamp a requested step rate into the representable range.
#[inline]
pub fn clamp_rate(rate: f32, f_step_min: f32, f_step_max: f32) -> f32 {
    if rate.is_nan() {
        f_step_min
    } else {
        rate.clamp(f_step_min, f_step_max)
    }
}

/// Next oversampling level for a dominant step `rate` [steps/s].
///
/// Raises the level while the oversampled tick rate stays below `cutoff`;
/// lowers it once the rate one level down reaches `2 · cutoff`. The gap
/// between the two thresholds keeps the level from toggling on every
/// segment of a slow ramp.
pub fn dss_level(rate: f32, current: u8, cutoff: f32, max_level: u8) -> u8 {
    let max_level = max_level.min(MAX_DSS_LEVEL);
    let mut level = current.min(max_level);
    while level > 0 && rate * f32::from(1u16 << (level - 1)) >= 2.0 * cutoff {
        level -= 1;
    }
    while level < max_level && rate * f32::from(1u16 << level) < cutoff {
        level += 1;
    }
    level
}
