//! Concrete robot models
//!
//! The lattice only sees robots through [`crate::common::RobotModel`]; this
//! module provides a planar serial arm used by the demo and the tests.

pub mod planar_arm;

pub use planar_arm::{JointKind, PlanarArm, PlanarIkConfig};
