//! Shared machine definitions.

use evo_motion::config::Settings;
use evo_motion::machine::LineRequest;
use evo_motion::sim::SimRunner;

/// Cartesian mill: 80 steps/mm on X/Y (6000 mm/min), 400 on Z (600 mm/min).
pub const MACHINE: &str = r#"
[shared]
service_name = "integration"

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
min_travel = 0.0
max_travel = 200.0

[[axes]]
name = "Y"
min_travel = 0.0
max_travel = 200.0

[[axes]]
name = "Z"
min_travel = -80.0
max_travel = 0.0
"#;

/// [`MACHINE`] with extra TOML appended.
pub fn settings(extra: &str) -> Settings {
    Settings::from_toml(&format!("{MACHINE}\n{extra}")).unwrap()
}

pub fn sim(extra: &str) -> SimRunner {
    SimRunner::from_settings(settings(extra))
}

/// Queue a feed move, panicking on rejection.
pub fn line(sim: &mut SimRunner, target: [f32; 3], feed: f32) {
    sim.machine
        .queue_line(LineRequest::feed(target, feed))
        .unwrap();
}
