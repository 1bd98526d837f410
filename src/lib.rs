//! manip_lattice - search-based motion planning graphs for articulated robots
//!
//! This crate turns a robot's joint space into a discrete state lattice that
//! a generic graph search can traverse, and augments it with an experience
//! graph of prior demonstrations.

// Core modules
pub mod common;
pub mod utils;

// Collaborators
pub mod robot;
pub mod collision;

// Planning graphs
pub mod graph;

// Re-export common types for convenience
pub use common::{Coord, Cost, GoalConstraint, Pose, RobotState, StateId, Successors};
pub use common::{CollisionChecker, ForwardKinematics, IkOption, InverseKinematics, RobotModel};
pub use common::{LatticeError, LatticeResult};
