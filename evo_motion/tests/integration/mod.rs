pub mod fixtures;

mod hold_resume;
mod homing;
mod kinematics_roundtrip;
mod motion_profile;
mod overrides;
mod probing;
mod safety_stop;
