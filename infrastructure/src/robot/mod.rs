//! Robot backends.

pub mod simulated;

pub use simulated::{ArmState, SimulatedArm};
