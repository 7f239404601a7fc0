//! Configuration loading and runtime settings.
//!
//! `load_config()` reads a [`MotionConfig`] from TOML, runs the per-section
//! bounds checks and the cross-section checks below, and converts machine
//! units into the step units the planner and interpolator work in.
//!
//! Cross-section rules:
//! - a stepper's top rate must fit under `f_step_max`
//! - with oversampling enabled, twice the DSS cutoff must fit under `f_step_max`
//! - the homing pull-off must move every driven stepper at least one step
//!
//! [`Settings`] is read-only once a machine is built from it.

use std::path::Path;

use evo_common::config::{ConfigError, ConfigLoader, SharedConfig};
use evo_common::consts::{AXIS_COUNT, STEPPER_COUNT};
use evo_common::motion::config::{
    HomingConfig, InterpolatorConfig, KinematicsConfig, LimitsConfig, MotionConfig, PlannerConfig,
};
use evo_common::motion::overrides::OverrideConfig;
use tracing::{debug, info};

// ─── Runtime Settings ───────────────────────────────────────────────

/// Per-stepper limits in step units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperLimits {
    /// Steps per machine unit.
    pub steps_per_mm: f32,
    /// Top rate [steps/s].
    pub max_rate: f32,
    /// Acceleration [steps/s²].
    pub acceleration: f32,
}

impl StepperLimits {
    /// Placeholder for channels the geometry does not drive.
    pub const UNUSED: Self = Self {
        steps_per_mm: 0.0,
        max_rate: 0.0,
        acceleration: 0.0,
    };
}

/// Speed limits along one stepper-space direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLimits {
    /// Top cruise speed along the path [steps/s].
    pub max_rate: f32,
    /// Acceleration along the path [steps/s²].
    pub acceleration: f32,
}

/// Validated, unit-converted settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub shared: SharedConfig,
    pub planner: PlannerConfig,
    pub interpolator: InterpolatorConfig,
    /// Stepper channels the geometry drives (the rest stay idle).
    pub stepper_count: usize,
    pub steppers: [StepperLimits; STEPPER_COUNT],
    /// Per-axis lower travel bound [mm].
    pub min_travel: [f32; AXIS_COUNT],
    /// Per-axis upper travel bound [mm].
    pub max_travel: [f32; AXIS_COUNT],
    pub limits: LimitsConfig,
    pub homing: HomingConfig,
    pub overrides: OverrideConfig,
    pub kinematics: KinematicsConfig,
}

impl Settings {
    /// Validate a parsed config and convert it.
    pub fn from_config(config: &MotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut steppers = [StepperLimits::UNUSED; STEPPER_COUNT];
        for (slot, stepper) in steppers.iter_mut().zip(&config.steppers) {
            *slot = StepperLimits {
                steps_per_mm: stepper.steps_per_mm,
                max_rate: stepper.max_rate / 60.0 * stepper.steps_per_mm,
                acceleration: stepper.acceleration * stepper.steps_per_mm,
            };
        }

        let mut min_travel = [0.0; AXIS_COUNT];
        let mut max_travel = [0.0; AXIS_COUNT];
        for (i, axis) in config.axes.iter().enumerate() {
            min_travel[i] = axis.min_travel;
            max_travel[i] = axis.max_travel;
        }

        let settings = Self {
            shared: config.shared.clone(),
            planner: config.planner,
            interpolator: config.interpolator,
            stepper_count: config.steppers.len(),
            steppers,
            min_travel,
            max_travel,
            limits: config.limits,
            homing: config.homing,
            overrides: config.overrides,
            kinematics: config.kinematics,
        };
        settings.cross_validate(config)?;
        Ok(settings)
    }

    /// Parse and convert an in-memory TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::from_config(&MotionConfig::from_toml(content)?)
    }

    fn cross_validate(&self, config: &MotionConfig) -> Result<(), ConfigError> {
        let itp = &self.interpolator;
        for (limits, stepper) in self.steppers.iter().zip(&config.steppers) {
            if limits.max_rate > itp.f_step_max {
                return Err(ConfigError::ValidationError(format!(
                    "stepper '{}' max_rate {:.0} steps/s exceeds f_step_max {}",
                    stepper.name, limits.max_rate, itp.f_step_max
                )));
            }
            if self.homing.enabled && self.homing.pulloff * limits.steps_per_mm < 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "homing pulloff {} mm is less than one step on stepper '{}'",
                    self.homing.pulloff, stepper.name
                )));
            }
        }
        if itp.dss_max_oversampling > 0 && itp.dss_cutoff_freq * 2.0 > itp.f_step_max {
            return Err(ConfigError::ValidationError(format!(
                "dss_cutoff_freq {} leaves no headroom under f_step_max {}",
                itp.dss_cutoff_freq, itp.f_step_max
            )));
        }
        Ok(())
    }

    /// Duration of one segment [s].
    #[inline]
    pub fn segment_time(&self) -> f32 {
        1.0 / self.interpolator.segment_rate_hz as f32
    }

    /// Travel span of axis `index` [mm].
    #[inline]
    pub fn span(&self, index: usize) -> f32 {
        self.max_travel[index] - self.min_travel[index]
    }

    /// Speed and acceleration limits along the direction of `steps`.
    #[inline]
    pub fn path_limits(&self, steps: &[i32; STEPPER_COUNT]) -> PathLimits {
        PathLimits::along(&self.steppers, steps)
    }
}

impl PathLimits {
    /// Limits along the direction of `steps` given per-stepper limits.
    ///
    /// Each moving stepper caps the path value at `limit_i * |d| / |s_i|`,
    /// where `|d|` is the stepper-space length of the move.
    pub fn along(steppers: &[StepperLimits; STEPPER_COUNT], steps: &[i32; STEPPER_COUNT]) -> Self {
        let distance = steps
            .iter()
            .map(|&s| (s as f32) * (s as f32))
            .sum::<f32>()
            .sqrt();
        let mut limits = Self {
            max_rate: f32::INFINITY,
            acceleration: f32::INFINITY,
        };
        for (stepper, &s) in steppers.iter().zip(steps) {
            if s == 0 {
                continue;
            }
            let ratio = distance / s.unsigned_abs() as f32;
            limits.max_rate = limits.max_rate.min(stepper.max_rate * ratio);
            limits.acceleration = limits.acceleration.min(stepper.acceleration * ratio);
        }
        limits
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load, validate and convert the machine configuration.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let config = MotionConfig::load(path)?;
    debug!(
        steppers = config.steppers.len(),
        kinematics = config.kinematics.label(),
        "Parsed machine configuration"
    );
    let settings = Settings::from_config(&config)?;
    info!(
        service = %settings.shared.service_name,
        kinematics = settings.kinematics.label(),
        segment_rate_hz = settings.interpolator.segment_rate_hz,
        "Configuration OK"
    );
    Ok(settings)
}

/// Cartesian test machine: 80 steps/mm on X/Y, 400 on Z.
#[cfg(test)]
pub(crate) const TEST_MACHINE: &str = r#"
[shared]
service_name = "unit-test"

[planner]
junction_factor = 0.1

[interpolator]
step_clock_hz = 16000000
segment_rate_hz = 100
f_step_min = 4.0
f_step_max = 30000.0
dss_max_oversampling = 3
dss_cutoff_freq = 500.0

[[steppers]]
name = "X"
steps_per_mm = 80.0
max_rate = 6000.0
acceleration = 500.0

[[steppers]]
name = "Y"
steps_per_mm = 80.0
max_rate = 6000.0
acceleration = 500.0

[[steppers]]
name = "Z"
steps_per_mm = 400.0
max_rate = 600.0
acceleration = 100.0

[[axes]]
name = "X"
max_travel = 200.0

[[axes]]
name = "Y"
max_travel = 200.0

[[axes]]
name = "Z"
min_travel = -80.0
max_travel = 0.0
"#;

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings::from_toml(TEST_MACHINE).unwrap()
}
