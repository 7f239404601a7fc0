//! Motion domain types shared between the motion core and its collaborators.
//!
//! - [`block`] - Block requests, stepper masks and block flags
//! - [`config`] - Machine configuration sections
//! - [`overrides`] - Override percentages and real-time command bytes
//! - [`state`] - Execution state, machine status and alarm codes
//! - [`telemetry`] - Status snapshot and buffer counters

pub mod block;
pub mod config;
pub mod overrides;
pub mod state;
pub mod telemetry;
