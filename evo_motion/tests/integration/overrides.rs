//! Integration test: feed, rapid, spindle and coolant overrides.
//!
//! Override bytes are latched by the input path and applied on the next
//! background pass: feed and rapid through the planner, spindle and coolant
//! straight to the tool outputs.

use evo_common::motion::block::{Coolant, ToolState};
use evo_motion::machine::LineRequest;
use evo_motion::sim::SimRunner;

use super::fixtures::{line, sim};

// ── Helpers ─────────────────────────────────────────────────────────

fn inject_all(sim: &mut SimRunner, byte: u8, times: usize) {
    for _ in 0..times {
        assert!(sim.inject(byte));
    }
}

fn rapid_duration(override_byte: Option<u8>) -> f64 {
    let mut sim = sim("");
    if let Some(byte) = override_byte {
        inject_all(&mut sim, byte, 1);
    }
    sim.machine
        .queue_line(LineRequest::rapid([100.0, 0.0, 0.0]))
        .unwrap();
    sim.run_until_idle(10.0).unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn spindle_and_coolant_follow_overrides() {
    let mut sim = sim("");
    sim.machine
        .queue_line(
            LineRequest::feed([30.0, 0.0, 0.0], 1200.0).with_tool(ToolState {
                spindle: 1000.0,
                coolant: Coolant::FLOOD,
            }),
        )
        .unwrap();
    sim.run_for(0.2);
    assert_eq!(sim.board().spindle(), 1000.0);
    assert_eq!(sim.board().coolant(), Coolant::FLOOD);

    inject_all(&mut sim, 0x9B, 1);
    sim.run_for(0.01);
    assert_eq!(sim.machine.overrides().spindle, 90);
    assert_eq!(sim.board().spindle(), 900.0);
    assert_eq!(sim.machine.status_snapshot().spindle, 900.0);

    inject_all(&mut sim, 0xA0, 1);
    inject_all(&mut sim, 0xA1, 1);
    sim.run_for(0.01);
    assert_eq!(sim.board().coolant(), Coolant::MIST);

    inject_all(&mut sim, 0x9E, 1);
    sim.run_for(0.01);
    assert_eq!(sim.board().spindle(), 0.0);
    inject_all(&mut sim, 0x9E, 1);
    sim.run_for(0.01);
    assert_eq!(sim.board().spindle(), 900.0);

    // Spindle overrides do not touch motion.
    sim.run_until_idle(5.0).unwrap();
    assert_eq!(sim.board().position(), [2400, 0, 0, 0]);
}

#[test]
fn spindle_override_clamps_to_range() {
    let mut sim = sim("");
    inject_all(&mut sim, 0x9A, 15);
    sim.run_for(0.01);
    assert_eq!(sim.machine.overrides().spindle, 200);
    inject_all(&mut sim, 0x99, 1);
    sim.run_for(0.01);
    assert_eq!(sim.machine.overrides().spindle, 100);
}

#[test]
fn override_bytes_between_passes_all_apply() {
    let mut sim = sim("");
    inject_all(&mut sim, 0x93, 3);
    inject_all(&mut sim, 0x9C, 4);
    sim.run_for(0.01);
    assert_eq!(sim.machine.overrides().feed, 103);
    assert_eq!(sim.machine.overrides().spindle, 104);

    // Applied in arrival order: the reset lands between the steps.
    inject_all(&mut sim, 0x91, 2);
    inject_all(&mut sim, 0x90, 1);
    inject_all(&mut sim, 0x94, 1);
    sim.run_for(0.01);
    assert_eq!(sim.machine.overrides().feed, 99);
}

#[test]
fn feed_override_applies_mid_move() {
    let mut sim = sim("");
    line(&mut sim, [40.0, 0.0, 0.0], 1200.0);
    sim.run_for(0.5);
    // Five coarse steps down: 50 %.
    inject_all(&mut sim, 0x92, 5);
    let seconds = 0.5 + sim.run_until_idle(10.0).unwrap();
    assert_eq!(sim.machine.overrides().feed, 50);
    assert_eq!(sim.board().position(), [3200, 0, 0, 0]);
    // Nominal is about 2.05 s; the last 30 mm at half speed add 1.5 s.
    assert!(seconds > 3.0, "took {seconds}");
}

#[test]
fn rapid_override_slows_rapids() {
    let full = rapid_duration(None);
    let half = rapid_duration(Some(0x96));
    let quarter = rapid_duration(Some(0x97));
    assert!(half > full * 1.6, "{half} vs {full}");
    assert!(quarter > half * 1.6, "{quarter} vs {half}");
}

#[test]
fn rapid_override_leaves_feed_moves_alone() {
    let timed = |byte: Option<u8>| {
        let mut sim = sim("");
        if let Some(byte) = byte {
            inject_all(&mut sim, byte, 1);
        }
        line(&mut sim, [20.0, 0.0, 0.0], 600.0);
        sim.run_until_idle(10.0).unwrap()
    };
    let nominal = timed(None);
    let overridden = timed(Some(0x97));
    assert!((overridden - nominal).abs() < 0.05, "{overridden} vs {nominal}");
}
