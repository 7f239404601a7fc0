//! Integration test: geometry transforms built from configuration.
//!
//! `forward(inverse(p))` must land within step quantization of `p` for
//! every supported geometry, and segmented geometries must split a move
//! into sub-segments that end exactly on the target.

use evo_motion::config::Settings;
use evo_motion::kinematics::{self, Kinematics};
use proptest::prelude::*;

use super::fixtures::settings;

// ── Helpers ─────────────────────────────────────────────────────────

const DELTA: &str = r#"
[shared]
service_name = "delta"

[kinematics]
type = "linear_delta"
arm_length = 250.0
radius = 120.0
max_segment_length = 2.0

[[steppers]]
name = "A"
steps_per_mm = 100.0
max_rate = 12000.0
acceleration = 1000.0

[[steppers]]
name = "B"
steps_per_mm = 100.0
max_rate = 12000.0
acceleration = 1000.0

[[steppers]]
name = "C"
steps_per_mm = 100.0
max_rate = 12000.0
acceleration = 1000.0

[[axes]]
name = "X"
min_travel = -100.0
max_travel = 100.0

[[axes]]
name = "Y"
min_travel = -100.0
max_travel = 100.0

[[axes]]
name = "Z"
min_travel = 0.0
max_travel = 300.0
"#;

fn geometry(kind: &str) -> Box<dyn Kinematics> {
    let settings = match kind {
        "linear_delta" => Settings::from_toml(DELTA).unwrap(),
        "scara" => settings("[kinematics]\ntype = \"scara\"\ninner_arm = 150.0\nouter_arm = 100.0\n"),
        other => settings(&format!("[kinematics]\ntype = \"{other}\"\n")),
    };
    let kin = kinematics::build(&settings);
    assert_eq!(kin.name(), kind);
    kin
}

fn round_trip(kin: &dyn Kinematics, p: [f32; 3], tolerance: f32) -> Result<(), TestCaseError> {
    let steps = kin.inverse(&p).unwrap();
    let back = kin.forward(&steps);
    for i in 0..3 {
        prop_assert!(
            (back[i] - p[i]).abs() < tolerance,
            "{} {:?} -> {:?} -> {:?}",
            kin.name(),
            p,
            steps,
            back
        );
    }
    Ok(())
}

fn polar_point(r: f32, degrees: f32, z: f32) -> [f32; 3] {
    let a = degrees.to_radians();
    [r * a.cos(), r * a.sin(), z]
}

// ── Tests ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn cartesian_round_trip(x in -100.0f32..200.0, y in -100.0f32..200.0, z in -80.0f32..0.0) {
        round_trip(geometry("cartesian").as_ref(), [x, y, z], 0.01)?;
    }

    #[test]
    fn corexy_round_trip(x in -100.0f32..200.0, y in -100.0f32..200.0, z in -80.0f32..0.0) {
        round_trip(geometry("corexy").as_ref(), [x, y, z], 0.02)?;
    }

    #[test]
    fn delta_round_trip(x in -60.0f32..60.0, y in -60.0f32..60.0, z in 0.0f32..300.0) {
        round_trip(geometry("linear_delta").as_ref(), [x, y, z], 0.02)?;
    }

    #[test]
    fn scara_round_trip(r in 60.0f32..240.0, a in -170.0f32..170.0, z in -80.0f32..0.0) {
        round_trip(geometry("scara").as_ref(), polar_point(r, a, z), 0.06)?;
    }

    #[test]
    fn polar_round_trip(r in 1.0f32..150.0, a in -170.0f32..170.0, z in -80.0f32..0.0) {
        round_trip(geometry("polar").as_ref(), polar_point(r, a, z), 0.05)?;
    }
}

#[test]
fn linear_geometries_do_not_segment() {
    for kind in ["cartesian", "corexy"] {
        let kin = geometry(kind);
        assert_eq!(kin.max_segment_length(), None);
        let waypoints: Vec<_> = kin.segment_motion([0.0; 3], [50.0, 20.0, -3.0]).collect();
        assert_eq!(waypoints, vec![[50.0, 20.0, -3.0]]);
    }
}

#[test]
fn segmented_geometries_split_into_short_steps() {
    for kind in ["linear_delta", "scara", "polar"] {
        let kin = geometry(kind);
        let max = kin.max_segment_length().unwrap();
        let start = [10.0, 60.0, 0.0];
        let end = [70.0, 80.0, 5.0];

        let mut previous = start;
        let mut count = 0;
        for waypoint in kin.segment_motion(start, end) {
            let length = (0..3)
                .map(|i| (waypoint[i] - previous[i]).powi(2))
                .sum::<f32>()
                .sqrt();
            assert!(length <= max + 1e-3, "{kind}: {length} > {max}");
            assert!(kin.inverse(&waypoint).is_ok(), "{kind}: {waypoint:?}");
            previous = waypoint;
            count += 1;
        }
        assert_eq!(previous, end, "{kind}");
        assert!(count > 1, "{kind}");
    }
}

#[test]
fn unreachable_points_are_rejected() {
    // Beyond the reach of both links.
    assert!(geometry("scara").inverse(&[300.0, 0.0, 0.0]).is_err());
    // Outside the arm length from a tower.
    assert!(geometry("linear_delta").inverse(&[400.0, 0.0, 0.0]).is_err());
}
