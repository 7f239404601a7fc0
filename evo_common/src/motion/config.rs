//! Machine configuration structures.
//!
//! All sections deserialize from TOML through [`crate::config::ConfigLoader`].
//! Numeric parameters carry `MIN`/`MAX` bounds enforced by `validate()`;
//! optional sections use `#[serde(default)]`.
//!
//! Units at this level are machine units: mm, mm/min for rates, mm/s² for
//! acceleration. Conversion to step units happens once, when the motion core
//! builds its runtime settings.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    AXIS_COUNT, F_STEP_MAX_LIMIT, F_STEP_MIN_LIMIT, MAX_DSS_LEVEL, SEGMENT_RATE_HZ_MAX,
    SEGMENT_RATE_HZ_MIN, STEP_CLOCK_HZ_MAX, STEP_CLOCK_HZ_MIN, STEP_PULSE_US_MAX, STEPPER_COUNT,
};

use super::overrides::OverrideConfig;

fn out_of_range<T: std::fmt::Display>(name: &str, value: T, min: T, max: T) -> ConfigError {
    ConfigError::ValidationError(format!("{name} {value} out of range [{min}, {max}]"))
}

fn check_f32(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(out_of_range(name, value, min, max));
    }
    Ok(())
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete machine configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "evo-motion"
///
/// [kinematics]
/// type = "corexy"
///
/// [[steppers]]
/// name = "A"
/// steps_per_mm = 80.0
/// max_rate = 6000.0
/// acceleration = 500.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Logging and identification.
    pub shared: SharedConfig,

    /// Look-ahead planner parameters.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Step generation parameters.
    #[serde(default)]
    pub interpolator: InterpolatorConfig,

    /// Physical stepper channels, in channel order.
    pub steppers: Vec<StepperConfig>,

    /// Machine-space axes (X, Y, Z).
    pub axes: Vec<AxisConfig>,

    /// Limit supervision.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Homing cycle.
    #[serde(default)]
    pub homing: HomingConfig,

    /// Override ranges.
    #[serde(default)]
    pub overrides: OverrideConfig,

    /// Machine geometry.
    #[serde(default)]
    pub kinematics: KinematicsConfig,
}

impl MotionConfig {
    /// Validate every section and their cross-references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.planner.validate()?;
        self.interpolator.validate()?;
        self.limits_and_axes()?;
        self.homing.validate()?;
        self.overrides.validate()?;
        self.kinematics.validate()?;

        let required = self.kinematics.stepper_count();
        if self.steppers.len() != required {
            return Err(ConfigError::ValidationError(format!(
                "{} kinematics needs {} steppers, {} configured",
                self.kinematics.label(),
                required,
                self.steppers.len()
            )));
        }
        for (index, stepper) in self.steppers.iter().enumerate() {
            stepper.validate(index)?;
        }
        Ok(())
    }

    fn limits_and_axes(&self) -> Result<(), ConfigError> {
        if self.axes.len() != AXIS_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "expected {} axes, {} configured",
                AXIS_COUNT,
                self.axes.len()
            )));
        }
        for axis in &self.axes {
            axis.validate()?;
        }
        Ok(())
    }
}

// ─── Planner ────────────────────────────────────────────────────────

/// Junction and look-ahead parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Cornering tolerance in [0, 1]. 0 stops at every direction change.
    #[serde(default = "default_junction_factor")]
    pub junction_factor: f32,

    /// Floor for any junction speed [steps/s].
    #[serde(default)]
    pub minimum_junction_speed: f32,
}

fn default_junction_factor() -> f32 {
    0.1
}

impl PlannerConfig {
    /// Upper bound for `minimum_junction_speed` [steps/s].
    pub const MINIMUM_JUNCTION_SPEED_MAX: f32 = 1000.0;

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_f32("planner.junction_factor", self.junction_factor, 0.0, 1.0)?;
        check_f32(
            "planner.minimum_junction_speed",
            self.minimum_junction_speed,
            0.0,
            Self::MINIMUM_JUNCTION_SPEED_MAX,
        )
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            junction_factor: default_junction_factor(),
            minimum_junction_speed: 0.0,
        }
    }
}

// ─── Interpolator ───────────────────────────────────────────────────

/// Step clock and segment timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolatorConfig {
    /// Step clock source frequency [Hz].
    pub step_clock_hz: u32,
    /// Segment generation rate [Hz]; each segment covers `1 / rate` seconds.
    pub segment_rate_hz: u32,
    /// Lowest step rate the clock is programmed to [steps/s].
    pub f_step_min: f32,
    /// Highest step rate the clock is programmed to [steps/s].
    pub f_step_max: f32,
    /// Highest Dynamic Step Spread level (0 disables oversampling).
    pub dss_max_oversampling: u8,
    /// Step rate below which oversampling is raised [steps/s].
    pub dss_cutoff_freq: f32,
    /// Step pulse width [µs].
    pub step_pulse_width_us: u16,
}

impl Default for InterpolatorConfig {
    fn default() -> Self {
        Self {
            step_clock_hz: 16_000_000,
            segment_rate_hz: 100,
            f_step_min: 4.0,
            f_step_max: 30_000.0,
            dss_max_oversampling: 3,
            dss_cutoff_freq: 500.0,
            step_pulse_width_us: 4,
        }
    }
}

impl InterpolatorConfig {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(STEP_CLOCK_HZ_MIN..=STEP_CLOCK_HZ_MAX).contains(&self.step_clock_hz) {
            return Err(out_of_range(
                "interpolator.step_clock_hz",
                self.step_clock_hz,
                STEP_CLOCK_HZ_MIN,
                STEP_CLOCK_HZ_MAX,
            ));
        }
        if !(SEGMENT_RATE_HZ_MIN..=SEGMENT_RATE_HZ_MAX).contains(&self.segment_rate_hz) {
            return Err(out_of_range(
                "interpolator.segment_rate_hz",
                self.segment_rate_hz,
                SEGMENT_RATE_HZ_MIN,
                SEGMENT_RATE_HZ_MAX,
            ));
        }
        check_f32(
            "interpolator.f_step_min",
            self.f_step_min,
            F_STEP_MIN_LIMIT,
            F_STEP_MAX_LIMIT,
        )?;
        check_f32(
            "interpolator.f_step_max",
            self.f_step_max,
            F_STEP_MIN_LIMIT,
            F_STEP_MAX_LIMIT,
        )?;
        if self.f_step_min >= self.f_step_max {
            return Err(ConfigError::ValidationError(format!(
                "interpolator.f_step_min {} must be below f_step_max {}",
                self.f_step_min, self.f_step_max
            )));
        }
        if self.dss_max_oversampling > MAX_DSS_LEVEL {
            return Err(out_of_range(
                "interpolator.dss_max_oversampling",
                self.dss_max_oversampling,
                0,
                MAX_DSS_LEVEL,
            ));
        }
        check_f32(
            "interpolator.dss_cutoff_freq",
            self.dss_cutoff_freq,
            self.f_step_min,
            self.f_step_max,
        )?;
        if self.step_pulse_width_us == 0 || self.step_pulse_width_us > STEP_PULSE_US_MAX {
            return Err(out_of_range(
                "interpolator.step_pulse_width_us",
                self.step_pulse_width_us,
                1,
                STEP_PULSE_US_MAX,
            ));
        }
        // Step-reset fires half a period after step-assert; the pulse must fit.
        let half_period_us = 500_000.0 / self.f_step_max;
        if (self.step_pulse_width_us as f32) > half_period_us {
            return Err(ConfigError::ValidationError(format!(
                "step pulse {} µs does not fit half of the {} Hz step period",
                self.step_pulse_width_us, self.f_step_max
            )));
        }
        Ok(())
    }
}

// ─── Steppers & Axes ────────────────────────────────────────────────

/// One physical stepper channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Label used in logs.
    pub name: String,
    /// Steps per machine unit (mm, or degree for angular joints).
    pub steps_per_mm: f32,
    /// Highest rate [units/min].
    pub max_rate: f32,
    /// Acceleration limit [units/s²].
    pub acceleration: f32,
}

impl StepperConfig {
    pub const STEPS_PER_MM_MIN: f32 = 0.01;
    pub const STEPS_PER_MM_MAX: f32 = 100_000.0;
    pub const MAX_RATE_MIN: f32 = 1.0;
    pub const MAX_RATE_MAX: f32 = 1_000_000.0;
    pub const ACCELERATION_MIN: f32 = 0.1;
    pub const ACCELERATION_MAX: f32 = 100_000.0;

    /// Validate one channel.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "stepper {index} has empty name"
            )));
        }
        check_f32(
            &format!("stepper '{}' steps_per_mm", self.name),
            self.steps_per_mm,
            Self::STEPS_PER_MM_MIN,
            Self::STEPS_PER_MM_MAX,
        )?;
        check_f32(
            &format!("stepper '{}' max_rate", self.name),
            self.max_rate,
            Self::MAX_RATE_MIN,
            Self::MAX_RATE_MAX,
        )?;
        check_f32(
            &format!("stepper '{}' acceleration", self.name),
            self.acceleration,
            Self::ACCELERATION_MIN,
            Self::ACCELERATION_MAX,
        )
    }
}

/// Travel bounds for one machine-space axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis label.
    pub name: String,
    /// Lowest reachable coordinate [mm].
    #[serde(default)]
    pub min_travel: f32,
    /// Highest reachable coordinate [mm].
    pub max_travel: f32,
}

impl AxisConfig {
    /// Largest absolute travel coordinate [mm].
    pub const TRAVEL_LIMIT: f32 = 100_000.0;

    /// Validate travel bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_f32(
            &format!("axis '{}' min_travel", self.name),
            self.min_travel,
            -Self::TRAVEL_LIMIT,
            Self::TRAVEL_LIMIT,
        )?;
        check_f32(
            &format!("axis '{}' max_travel", self.name),
            self.max_travel,
            -Self::TRAVEL_LIMIT,
            Self::TRAVEL_LIMIT,
        )?;
        if self.min_travel >= self.max_travel {
            return Err(ConfigError::ValidationError(format!(
                "axis '{}' min_travel {} must be below max_travel {}",
                self.name, self.min_travel, self.max_travel
            )));
        }
        Ok(())
    }

    /// Length of the travel range [mm].
    #[inline]
    pub fn span(&self) -> f32 {
        self.max_travel - self.min_travel
    }
}

// ─── Limits & Homing ────────────────────────────────────────────────

/// Limit supervision switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Stop and alarm when a limit input trips outside homing.
    pub hard_limits: bool,
    /// Reject targets outside the configured travel.
    pub soft_limits: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hard_limits: true,
            soft_limits: false,
        }
    }
}

/// Homing cycle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingConfig {
    /// Homing available (and required after power-up).
    pub enabled: bool,
    /// Approach rate toward the switch [mm/min].
    pub seek_rate: f32,
    /// Pull-off rate away from the switch [mm/min].
    pub feed_rate: f32,
    /// Pull-off distance after the switch trips [mm].
    pub pulloff: f32,
    /// Bit `i` set: axis `i` homes toward its positive end.
    pub positive_direction_mask: u8,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seek_rate: 500.0,
            feed_rate: 50.0,
            pulloff: 1.0,
            positive_direction_mask: 0,
        }
    }
}

impl HomingConfig {
    pub const RATE_MIN: f32 = 1.0;
    pub const RATE_MAX: f32 = 100_000.0;
    pub const PULLOFF_MAX: f32 = 100.0;

    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_f32("homing.seek_rate", self.seek_rate, Self::RATE_MIN, Self::RATE_MAX)?;
        check_f32("homing.feed_rate", self.feed_rate, Self::RATE_MIN, Self::RATE_MAX)?;
        check_f32("homing.pulloff", self.pulloff, 0.0, Self::PULLOFF_MAX)?;
        if self.positive_direction_mask >> AXIS_COUNT != 0 {
            return Err(ConfigError::ValidationError(format!(
                "homing.positive_direction_mask {:#04x} names axes beyond {}",
                self.positive_direction_mask, AXIS_COUNT
            )));
        }
        Ok(())
    }

    /// Whether axis `index` homes toward its positive end.
    #[inline]
    pub const fn homes_positive(&self, index: usize) -> bool {
        self.positive_direction_mask & (1 << index) != 0
    }
}

// ─── Kinematics ─────────────────────────────────────────────────────

/// Machine geometry, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KinematicsConfig {
    /// One stepper per axis; optionally a second motor on one axis.
    Cartesian {
        /// Axis driven by a second motor on the last stepper channel.
        #[serde(default)]
        dual_drive_axis: Option<u8>,
    },
    /// Belt-coupled XY gantry: A = X + Y, B = X - Y.
    #[serde(rename = "corexy")]
    CoreXy,
    /// Three vertical towers with parallel arms.
    LinearDelta {
        /// Diagonal rod length [mm].
        arm_length: f32,
        /// Tower radius minus effector offset [mm].
        radius: f32,
        /// Longest straight sub-segment handed to the planner [mm].
        #[serde(default = "default_segment_length")]
        max_segment_length: f32,
    },
    /// Two-link planar arm plus a linear Z.
    Scara {
        /// Shoulder to elbow [mm].
        inner_arm: f32,
        /// Elbow to tool [mm].
        outer_arm: f32,
        #[serde(default = "default_segment_length")]
        max_segment_length: f32,
    },
    /// Radius, rotation and linear Z.
    Polar {
        #[serde(default = "default_segment_length")]
        max_segment_length: f32,
    },
}

fn default_segment_length() -> f32 {
    1.0
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self::Cartesian {
            dual_drive_axis: None,
        }
    }
}

impl KinematicsConfig {
    pub const SEGMENT_LENGTH_MIN: f32 = 0.01;
    pub const SEGMENT_LENGTH_MAX: f32 = 100.0;
    pub const LENGTH_MAX: f32 = 10_000.0;

    /// Stepper channels this geometry drives.
    pub const fn stepper_count(&self) -> usize {
        match self {
            Self::Cartesian {
                dual_drive_axis: Some(_),
            } => AXIS_COUNT + 1,
            _ => AXIS_COUNT,
        }
    }

    /// Short name for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cartesian { .. } => "cartesian",
            Self::CoreXy => "corexy",
            Self::LinearDelta { .. } => "linear_delta",
            Self::Scara { .. } => "scara",
            Self::Polar { .. } => "polar",
        }
    }

    /// Validate geometry constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Cartesian { dual_drive_axis } => {
                if let Some(axis) = dual_drive_axis {
                    if axis as usize >= AXIS_COUNT {
                        return Err(out_of_range(
                            "kinematics.dual_drive_axis",
                            axis as usize,
                            0,
                            AXIS_COUNT - 1,
                        ));
                    }
                    if AXIS_COUNT + 1 > STEPPER_COUNT {
                        return Err(ConfigError::ValidationError(
                            "dual drive needs a spare stepper channel".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            Self::CoreXy => Ok(()),
            Self::LinearDelta {
                arm_length,
                radius,
                max_segment_length,
            } => {
                check_f32("kinematics.arm_length", arm_length, 1.0, Self::LENGTH_MAX)?;
                check_f32("kinematics.radius", radius, 1.0, Self::LENGTH_MAX)?;
                if radius >= arm_length {
                    return Err(ConfigError::ValidationError(format!(
                        "delta radius {radius} must be shorter than arm_length {arm_length}"
                    )));
                }
                Self::check_segment(max_segment_length)
            }
            Self::Scara {
                inner_arm,
                outer_arm,
                max_segment_length,
            } => {
                check_f32("kinematics.inner_arm", inner_arm, 1.0, Self::LENGTH_MAX)?;
                check_f32("kinematics.outer_arm", outer_arm, 1.0, Self::LENGTH_MAX)?;
                Self::check_segment(max_segment_length)
            }
            Self::Polar { max_segment_length } => Self::check_segment(max_segment_length),
        }
    }

    fn check_segment(length: f32) -> Result<(), ConfigError> {
        check_f32(
            "kinematics.max_segment_length",
            length,
            Self::SEGMENT_LENGTH_MIN,
            Self::SEGMENT_LENGTH_MAX,
        )
    }
}
