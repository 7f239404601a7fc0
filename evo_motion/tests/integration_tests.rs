//! Integration tests for the EVO motion core.
//!
//! These tests run the planner, interpolator, kinematics and real-time
//! coordination together on the simulated board, in simulated time.

mod integration;
