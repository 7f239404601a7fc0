//! EVO Common Library
//!
//! Shared types for the EVO step-motion workspace: compile-time limits,
//! configuration loading, motion domain types and hardware capability
//! traits.
//!
//! # Module Structure
//!
//! - [`consts`] - Fixed capacities and numeric bounds
//! - [`config`] - Configuration loading traits and types
//! - [`motion`] - Block, state, override, config and telemetry types
//! - [`hal`] - Board capability traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use evo_common::prelude::*;
//!
//! let state = ExecState::HOLD | ExecState::DOOR;
//! assert_eq!(MachineStatus::from_exec(state), MachineStatus::Door);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod motion;
pub mod prelude;
