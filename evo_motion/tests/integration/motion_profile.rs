//! Integration test: planned motion on the simulated board.
//!
//! Validates step exactness, move duration against the programmed feed,
//! junction carry-through on collinear moves, feed override and planner
//! back-pressure.

use evo_common::motion::state::MachineStatus;
use evo_motion::error::MotionError;
use evo_motion::machine::LineRequest;
use evo_motion::sim::SimRunner;
use proptest::prelude::*;

use super::fixtures::{line, sim};

// ── Helpers ─────────────────────────────────────────────────────────

fn timed_move(target: [f32; 3], feed: f32, setup: impl FnOnce(&mut SimRunner)) -> f64 {
    let mut sim = sim("");
    setup(&mut sim);
    line(&mut sim, target, feed);
    sim.run_until_idle(30.0).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn single_move_emits_exact_steps() {
    let mut sim = sim("");
    line(&mut sim, [10.0, 5.0, -1.0], 600.0);
    sim.run_until_idle(10.0).unwrap();

    assert_eq!(sim.board().position(), [800, 400, -400, 0]);
    assert_eq!(sim.machine.interpolator().rt_position(), [800, 400, -400, 0]);
    assert_eq!(sim.board().violations(), 0);
    assert_eq!(sim.board().mask_depth(), 0);
    assert_eq!(sim.machine.status(), MachineStatus::Idle);
    let position = sim.machine.position();
    assert!((position[0] - 10.0).abs() < 1e-4);
    assert!((position[2] + 1.0).abs() < 1e-4);
}

#[test]
fn closed_path_returns_to_origin() {
    let mut sim = sim("");
    for target in [
        [20.0, 0.0, 0.0],
        [20.0, 20.0, 0.0],
        [0.0, 20.0, 0.0],
        [0.0, 0.0, 0.0],
    ] {
        line(&mut sim, target, 1500.0);
    }
    sim.run_until_idle(20.0).unwrap();

    assert_eq!(sim.board().position(), [0; 4]);
    assert_eq!(sim.board().pulses(), [3200, 3200, 0, 0]);
    assert_eq!(sim.machine.interpolator().last_block_residue(), [0; 4]);
}

#[test]
fn duration_follows_programmed_feed() {
    // 50 mm at 20 mm/s, 0.04 s of ramps.
    let seconds = timed_move([50.0, 0.0, 0.0], 1200.0, |_| {});
    assert!(seconds > 2.5 && seconds < 2.7, "took {seconds}");
}

#[test]
fn step_clock_stays_under_ceiling() {
    let mut sim = sim("");
    sim.machine
        .queue_line(LineRequest::rapid([150.0, 150.0, 0.0]))
        .unwrap();
    sim.run_until_idle(20.0).unwrap();
    assert!(sim.board().peak_rate() <= 30_000.0 * 1.01);
    assert_eq!(sim.board().position(), [12_000, 12_000, 0, 0]);
}

#[test]
fn slow_move_runs_with_oversampling() {
    // 10 mm/min on Z: 66 steps/s, well under the oversampling cutoff.
    let mut sim = sim("");
    line(&mut sim, [0.0, 0.0, -0.5], 10.0);
    let seconds = sim.run_until_idle(10.0).unwrap();
    assert_eq!(sim.board().position(), [0, 0, -200, 0]);
    assert!(seconds > 2.9, "took {seconds}");
    // Each step is spread over several ticks.
    assert!(sim.ticks() > 4 * 200, "{} ticks", sim.ticks());
}

#[test]
fn collinear_moves_do_not_stop_at_junctions() {
    let mut sim = sim("");
    for i in 1..=10 {
        line(&mut sim, [i as f32, 0.0, 0.0], 600.0);
    }
    let seconds = sim.run_until_idle(10.0).unwrap();
    // One 10 mm move takes 1.02 s; stopping at every junction about 1.2 s.
    assert!(seconds < 1.1, "took {seconds}");
    assert_eq!(sim.board().position(), [800, 0, 0, 0]);
}

#[test]
fn feed_override_scales_duration() {
    let nominal = timed_move([20.0, 0.0, 0.0], 600.0, |_| {});
    let doubled = timed_move([20.0, 0.0, 0.0], 600.0, |sim| {
        for _ in 0..10 {
            assert!(sim.inject(0x91));
        }
    });
    assert!(doubled < nominal * 0.6, "{doubled} vs {nominal}");
}

#[test]
fn full_planner_is_backpressure() {
    let mut sim = sim("");
    for i in 1..=16 {
        line(&mut sim, [i as f32, 0.0, 0.0], 600.0);
    }
    let err = sim
        .machine
        .queue_line(LineRequest::feed([20.0, 0.0, 0.0], 600.0))
        .unwrap_err();
    assert!(matches!(err, MotionError::Enqueue(e) if e.is_backpressure()));
    assert_eq!(sim.machine.buffer_counters().rejected_full, 1);

    sim.run_for(0.5);
    line(&mut sim, [20.0, 0.0, 0.0], 600.0);
    sim.run_until_idle(10.0).unwrap();
    assert_eq!(sim.board().position(), [1600, 0, 0, 0]);
}

#[test]
fn status_request_is_latched() {
    let mut sim = sim("");
    assert!(!sim.machine.take_status_request());
    assert!(sim.inject(b'?'));
    assert!(!sim.inject(b'G'));
    sim.run_for(0.01);
    assert!(sim.machine.take_status_request());
    assert!(!sim.machine.take_status_request());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn random_paths_end_on_exact_steps(
        targets in prop::collection::vec((0.0f32..15.0, 0.0f32..15.0, -3.0f32..0.0), 1..5),
        feed in 300.0f32..3000.0,
    ) {
        let mut sim = sim("");
        for &(x, y, z) in &targets {
            line(&mut sim, [x, y, z], feed);
        }
        sim.run_until_idle(120.0).unwrap();

        let (x, y, z) = targets[targets.len() - 1];
        let expected = sim.machine.kinematics().inverse(&[x, y, z]).unwrap();
        prop_assert_eq!(sim.board().position(), expected);
        prop_assert_eq!(sim.machine.interpolator().rt_position(), expected);
        prop_assert_eq!(sim.board().violations(), 0);
    }
}
