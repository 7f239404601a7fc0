//! # EVO Motion Library
//!
//! Stepper motion core for the EVO workspace. Turns straight machine-space
//! moves into timed step pulses under a look-ahead velocity plan, and ties
//! limit, control and probe inputs to the motion through a small set of
//! atomic execution-state bits.
//!
//! ## Pipeline
//!
//! 1. **Kinematics**: machine position [mm] to stepper position [steps]
//! 2. **Planner**: ring of stepper-space blocks with junction-limited,
//!    acceleration-feasible entry speeds
//! 3. **Interpolator prep**: slices the executing block into fixed-time
//!    segments with a per-segment step period and oversampling level
//! 4. **Step callbacks**: Bresenham pulse generation, one tick at a time
//!
//! ## Contexts
//!
//! The step callbacks and the input edge handlers run at interrupt level
//! and never allocate, log or block. Everything else runs in the background
//! loop ([`machine::Machine::run_background`]).
//!
//! [`sim`] provides an in-memory board and a discrete-event runner for
//! tests, benchmarks and the `evo_motion` simulator binary.

#![deny(clippy::disallowed_types)]

pub mod config;
pub mod error;
pub mod homing;
pub mod interpolator;
pub mod kinematics;
pub mod machine;
pub mod planner;
pub mod realtime;
pub mod sim;

pub use machine::{LineRequest, Machine};
